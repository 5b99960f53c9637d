//! Keyword-to-entity resolution against the graph store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error};

use lexigraph_core::config::RetrievalConfig;
use lexigraph_core::error::CoreResult;
use lexigraph_core::model::{sort_scored_entities, ScoredEntity};
use lexigraph_core::store::graph::{node_result, run_query, search_string_from, GraphStore};

use crate::utils::parallel_map;

/// Maps keywords to scored graph entities.
///
/// Each keyword resolves independently; scores for the same entity across
/// different keywords are summed. A keyword may carry a classification
/// filter using the `keyword|classification` convention.
pub struct EntityResolver {
    graph_store: Arc<dyn GraphStore>,
    config: RetrievalConfig,
}

impl EntityResolver {
    pub fn new(graph_store: Arc<dyn GraphStore>, config: RetrievalConfig) -> Self {
        Self {
            graph_store,
            config,
        }
    }

    /// Resolve keywords into a score-ordered entity list.
    ///
    /// Empty input issues no queries. Per-keyword query failures are
    /// logged and excluded; total failure degrades to an empty list.
    pub async fn get_entities(&self, keywords: &[String]) -> Vec<ScoredEntity> {
        if keywords.is_empty() {
            return Vec::new();
        }

        let batches = parallel_map(keywords.to_vec(), keywords.len(), |keyword| async move {
            match self.entities_for_keyword(&keyword).await {
                Ok(entities) => entities,
                Err(e) => {
                    error!(keyword = %keyword, error = %e, "entity resolution failed for keyword");
                    Vec::new()
                }
            }
        })
        .await;

        let mut merged: HashMap<String, ScoredEntity> = HashMap::new();
        for scored in batches.into_iter().flatten() {
            match merged.entry(scored.entity.entity_id.clone()) {
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    entry.get_mut().score += scored.score;
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(scored);
                }
            }
        }

        let mut entities: Vec<ScoredEntity> = merged.into_values().collect();
        sort_scored_entities(&mut entities);

        debug!(count = entities.len(), "resolved entities");
        entities
    }

    async fn entities_for_keyword(&self, keyword: &str) -> CoreResult<Vec<ScoredEntity>> {
        let entity_id = self.graph_store.node_id("entity.entityId");
        let entity_selector = node_result("entity", Some(&entity_id), &["value", "class"]);

        let (keyword, classification) = match keyword.split_once('|') {
            Some((k, c)) => (k, Some(c)),
            None => (keyword, None),
        };

        let classification_clause = if classification.is_some() {
            " AND entity.class STARTS WITH $classification"
        } else {
            ""
        };

        let query = format!(
            r#"
        // get entities for keyword
        MATCH (entity:`__Entity__`)-[r:`__SUBJECT__`|`__OBJECT__`]->(:`__Fact__`)
        WHERE entity.search_str = $keyword{classification_clause}
        WITH entity, count(r) AS score ORDER BY score DESC
        RETURN {{
            {entity_selector},
            score: score
        }} AS result"#
        );

        let mut parameters = json!({ "keyword": search_string_from(keyword) });
        if let Some(classification) = classification {
            parameters["classification"] = classification.into();
        }

        let rows = run_query(&*self.graph_store, &query, parameters, &self.config.retry).await?;

        let mut entities = Vec::new();
        for row in rows {
            let scored: ScoredEntity = serde_json::from_value(row["result"].clone())?;
            if scored.score != 0.0 {
                entities.push(scored);
            }
        }
        Ok(entities)
    }

    /// Top up resolved entities with close graph neighbours.
    ///
    /// Runs only when fewer than `max_keywords` entities resolved. Walks
    /// one to two relation hops with a shrinking per-hop neighbour cap,
    /// scores the discovered neighbours by fact count, and admits those
    /// scoring within twice the strongest seed, keeping the list at
    /// `max_keywords`.
    pub async fn expand_entities(
        &self,
        mut scored_entities: Vec<ScoredEntity>,
    ) -> CoreResult<Vec<ScoredEntity>> {
        if scored_entities.is_empty() || scored_entities.len() >= self.config.max_keywords {
            return Ok(scored_entities);
        }

        let upper_score_threshold = scored_entities
            .iter()
            .map(|e| e.score)
            .fold(f64::MIN, f64::max)
            * 2.0;

        let original_entity_ids: HashSet<String> = scored_entities
            .iter()
            .filter(|e| e.score > 0.0)
            .map(|e| e.entity.entity_id.clone())
            .collect();

        let mut neighbour_entity_ids: HashSet<String> = HashSet::new();
        let mut start_entity_ids = original_entity_ids.clone();
        let mut exclude_entity_ids = original_entity_ids.clone();

        let entity_id = self.graph_store.node_id("entity.entityId");
        let other_id = self.graph_store.node_id("other.entityId");

        for limit in (2..=3).rev() {
            let query = format!(
                r#"
            // expand entities
            MATCH (entity:`__Entity__`)
            -[:`__SUBJECT__`|`__OBJECT__`]->()<-[:`__SUBJECT__`|`__OBJECT__`]-
            (other:`__Entity__`)
            WHERE {entity_id} IN $entityIds
            AND NOT {other_id} IN $excludeEntityIds
            WITH entity, other
            MATCH (other)-[r:`__SUBJECT__`|`__OBJECT__`]->()
            WITH entity, other, count(r) AS score ORDER BY score DESC
            RETURN {{
                entity: entity{{.entityId}},
                others: collect(DISTINCT {other_id})[0..$limit]
            }} AS result"#
            );

            let parameters = json!({
                "entityIds": start_entity_ids.iter().collect::<Vec<_>>(),
                "excludeEntityIds": exclude_entity_ids.iter().collect::<Vec<_>>(),
                "limit": limit,
            });

            let rows = run_query(&*self.graph_store, &query, parameters, &self.config.retry).await?;

            let mut discovered: HashSet<String> = HashSet::new();
            for row in rows {
                if let Some(others) = row.pointer("/result/others").and_then(|v| v.as_array()) {
                    discovered.extend(
                        others
                            .iter()
                            .filter_map(|v| v.as_str())
                            .map(|s| s.to_string()),
                    );
                }
            }

            neighbour_entity_ids.extend(discovered.iter().cloned());
            exclude_entity_ids.extend(discovered.iter().cloned());
            start_entity_ids = discovered;
        }

        if neighbour_entity_ids.is_empty() {
            return Ok(scored_entities);
        }

        let entity_selector = node_result("entity", Some(&entity_id), &["value", "class"]);
        let query = format!(
            r#"
        // expand entities: score entities by number of facts
        MATCH (entity:`__Entity__`)-[r:`__SUBJECT__`]->()
        WHERE {entity_id} IN $entityIds
        WITH entity, count(r) AS score
        RETURN {{
            {entity_selector},
            score: score
        }} AS result"#
        );

        let parameters = json!({
            "entityIds": neighbour_entity_ids.iter().collect::<Vec<_>>(),
        });

        let rows = run_query(&*self.graph_store, &query, parameters, &self.config.retry).await?;

        let mut neighbours: Vec<ScoredEntity> = Vec::new();
        for row in rows {
            let scored: ScoredEntity = serde_json::from_value(row["result"].clone())?;
            if !original_entity_ids.contains(&scored.entity.entity_id)
                && scored.score > 0.0
                && scored.score <= upper_score_threshold
            {
                neighbours.push(scored);
            }
        }
        sort_scored_entities(&mut neighbours);

        let room = self.config.max_keywords - scored_entities.len();
        scored_entities.extend(neighbours.into_iter().take(room));
        sort_scored_entities(&mut scored_entities);

        debug!(count = scored_entities.len(), "expanded entities");
        Ok(scored_entities)
    }
}
