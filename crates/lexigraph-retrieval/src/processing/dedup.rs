//! Duplicate-result merging.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;

use lexigraph_core::model::{SearchQuery, SearchResult, SearchResultCollection};

use super::Processor;

/// Merges results that reference the same source.
///
/// Topics with the same label combine; within a combined topic, chunks
/// merge by id and statements merge by value, summing duplicate
/// statement scores. Statements in every topic are re-sorted by score
/// afterwards, so no `(source, topic, statement)` triple appears twice.
pub struct DedupResults;

#[async_trait]
impl Processor for DedupResults {
    fn name(&self) -> &'static str {
        "DedupResults"
    }

    async fn process(
        &self,
        collection: SearchResultCollection,
        _query: &SearchQuery,
    ) -> SearchResultCollection {
        let SearchResultCollection {
            results,
            entities,
            entity_contexts,
        } = collection;

        let mut order: Vec<String> = Vec::new();
        let mut merged: HashMap<String, SearchResult> = HashMap::new();

        for result in results {
            let key = result.source.key().to_string();
            match merged.entry(key.clone()) {
                Entry::Vacant(entry) => {
                    order.push(key);
                    entry.insert(result);
                }
                Entry::Occupied(mut entry) => {
                    let existing = entry.get_mut();
                    for topic in result.topics {
                        match existing
                            .topics
                            .iter()
                            .position(|t| t.value == topic.value)
                        {
                            None => existing.topics.push(topic),
                            Some(index) => {
                                let existing_topic = &mut existing.topics[index];
                                for chunk in topic.chunks {
                                    if !existing_topic
                                        .chunks
                                        .iter()
                                        .any(|c| c.chunk_id == chunk.chunk_id)
                                    {
                                        existing_topic.chunks.push(chunk);
                                    }
                                }
                                for statement in topic.statements {
                                    match existing_topic
                                        .statements
                                        .iter()
                                        .position(|s| s.value == statement.value)
                                    {
                                        None => existing_topic.statements.push(statement),
                                        Some(index) => {
                                            existing_topic.statements[index].score +=
                                                statement.score;
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        let mut deduped: Vec<SearchResult> =
            order.into_iter().filter_map(|key| merged.remove(&key)).collect();
        for result in &mut deduped {
            for topic in &mut result.topics {
                topic
                    .statements
                    .sort_by(|a, b| b.score.total_cmp(&a.score));
            }
        }

        SearchResultCollection {
            results: deduped,
            entities,
            entity_contexts,
        }
    }
}
