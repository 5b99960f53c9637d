//! Entity-context trees.
//!
//! Expands a seed entity set into small multi-hop trees of related
//! entities. The materialized root-to-leaf paths ("contexts") bias later
//! retrieval and reranking toward entities that co-occur with the seeds.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use lexigraph_core::config::RetrievalConfig;
use lexigraph_core::error::CoreResult;
use lexigraph_core::model::{sort_scored_entities, ScoredEntity, SearchQuery};
use lexigraph_core::store::graph::{run_query, GraphStore};

use crate::utils::tfidf::score_values;

/// Per-hop neighbour caps, widest first. Shrinking the cap at each hop
/// keeps total fan-out bounded.
const HOP_NEIGHBOUR_CAPS: [usize; 2] = [3, 2];

/// One seed's expansion tree as an adjacency map.
type Adjacency = HashMap<String, Vec<String>>;

/// Builds entity contexts by bounded multi-hop expansion.
pub struct EntityContextBuilder {
    graph_store: Arc<dyn GraphStore>,
    config: RetrievalConfig,
}

impl EntityContextBuilder {
    pub fn new(graph_store: Arc<dyn GraphStore>, config: RetrievalConfig) -> Self {
        Self {
            graph_store,
            config,
        }
    }

    /// Expand seed entities into ordered entity contexts.
    ///
    /// Empty input returns an empty list without touching the backend.
    /// Only maximal root-to-leaf paths are kept, ranked by n-gram
    /// similarity to the query and capped at `max_context_paths`.
    pub async fn get_entity_contexts(
        &self,
        entities: &[ScoredEntity],
        query: &SearchQuery,
    ) -> CoreResult<Vec<Vec<ScoredEntity>>> {
        let seeds: Vec<&ScoredEntity> = entities
            .iter()
            .filter(|e| e.score > 0.0)
            .take(self.config.entity_context.num_entities)
            .collect();
        if seeds.is_empty() {
            return Ok(Vec::new());
        }

        let mut trees: Vec<(String, Adjacency)> = Vec::new();
        let mut neighbour_ids: HashSet<String> = HashSet::new();
        for seed in &seeds {
            let adjacency = self.expand_seed(&seed.entity.entity_id).await?;
            for children in adjacency.values() {
                neighbour_ids.extend(children.iter().cloned());
            }
            trees.push((seed.entity.entity_id.clone(), adjacency));
        }
        neighbour_ids.retain(|id| !seeds.iter().any(|s| s.entity.entity_id == *id));

        let baseline_score = seeds[0].score;
        let neighbours = self
            .score_neighbours(&neighbour_ids, baseline_score)
            .await?;

        let mut known: HashMap<String, ScoredEntity> = seeds
            .iter()
            .map(|s| (s.entity.entity_id.clone(), (*s).clone()))
            .collect();
        for neighbour in neighbours {
            known.insert(neighbour.entity.entity_id.clone(), neighbour);
        }

        let mut contexts: Vec<Vec<ScoredEntity>> = Vec::new();
        for (root, adjacency) in &trees {
            let mut path = Vec::new();
            let mut on_path = HashSet::new();
            walk(adjacency, root, &known, &mut path, &mut on_path, &mut contexts);
        }

        let contexts = self.rank_contexts(contexts, query);

        debug!(count = contexts.len(), "entity contexts materialized");
        Ok(contexts)
    }

    /// Multi-hop neighbour discovery for one seed. Discovered ids join the
    /// exclusion set so no entity is visited twice.
    async fn expand_seed(&self, seed_id: &str) -> CoreResult<Adjacency> {
        let entity_id = self.graph_store.node_id("entity.entityId");
        let other_id = self.graph_store.node_id("other.entityId");

        let mut adjacency: Adjacency = HashMap::new();
        let mut start_ids: HashSet<String> = HashSet::from([seed_id.to_string()]);
        let mut exclude_ids: HashSet<String> = start_ids.clone();

        for num_neighbours in HOP_NEIGHBOUR_CAPS {
            if start_ids.is_empty() {
                break;
            }

            let query = format!(
                r#"
            // entity context neighbours
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
                others: collect(DISTINCT {other_id})[0..$numNeighbours]
            }} AS result"#
            );

            let parameters = json!({
                "entityIds": start_ids.iter().collect::<Vec<_>>(),
                "excludeEntityIds": exclude_ids.iter().collect::<Vec<_>>(),
                "numNeighbours": num_neighbours,
            });

            let rows = run_query(&*self.graph_store, &query, parameters, &self.config.retry).await?;

            let mut discovered: HashSet<String> = HashSet::new();
            for row in rows {
                let Some(start) = row.pointer("/result/entity/entityId").and_then(|v| v.as_str())
                else {
                    continue;
                };
                if !start_ids.contains(start) {
                    continue;
                }
                let Some(others) = row.pointer("/result/others").and_then(|v| v.as_array()) else {
                    continue;
                };
                let children = adjacency.entry(start.to_string()).or_default();
                for other in others.iter().filter_map(|v| v.as_str()) {
                    if exclude_ids.contains(other) || children.iter().any(|c| c == other) {
                        continue;
                    }
                    children.push(other.to_string());
                    discovered.insert(other.to_string());
                }
            }

            exclude_ids.extend(discovered.iter().cloned());
            start_ids = discovered;
        }

        Ok(adjacency)
    }

    /// Global relation-count scores for discovered neighbours, admitting
    /// only those whose score is comparable to the strongest seed.
    async fn score_neighbours(
        &self,
        neighbour_ids: &HashSet<String>,
        baseline_score: f64,
    ) -> CoreResult<Vec<ScoredEntity>> {
        if neighbour_ids.is_empty() {
            return Ok(Vec::new());
        }

        let entity_id = self.graph_store.node_id("entity.entityId");
        let query = format!(
            r#"
        // entity context scores
        MATCH (entity:`__Entity__`)-[r:`__SUBJECT__`|`__OBJECT__`]->()
        WHERE {entity_id} IN $entityIds
        WITH entity, count(r) AS score
        RETURN {{
            entity: entity{{.entityId, .value, .class}},
            score: score
        }} AS result"#
        );

        let parameters = json!({
            "entityIds": neighbour_ids.iter().collect::<Vec<_>>(),
        });

        let rows = run_query(&*self.graph_store, &query, parameters, &self.config.retry).await?;

        let upper = baseline_score * self.config.entity_context.max_score_factor;
        let lower = baseline_score * self.config.entity_context.min_score_factor;

        let mut neighbours = Vec::new();
        for row in rows {
            let scored: ScoredEntity = serde_json::from_value(row["result"].clone())?;
            if scored.score >= lower && scored.score <= upper {
                neighbours.push(scored);
            }
        }
        sort_scored_entities(&mut neighbours);
        Ok(neighbours)
    }

    /// Order contexts by similarity to the query; contexts the scorer
    /// found no overlap for trail behind, then the whole list is capped.
    fn rank_contexts(
        &self,
        contexts: Vec<Vec<ScoredEntity>>,
        query: &SearchQuery,
    ) -> Vec<Vec<ScoredEntity>> {
        if contexts.is_empty() {
            return contexts;
        }

        let mut context_map: HashMap<String, Vec<ScoredEntity>> = HashMap::new();
        let mut keys: Vec<String> = Vec::new();
        for context in contexts {
            let key = context
                .iter()
                .map(|e| e.entity.value.to_lowercase())
                .collect::<Vec<_>>()
                .join(" ");
            if !context_map.contains_key(&key) {
                keys.push(key.clone());
            }
            context_map.insert(key, context);
        }

        let scored = score_values(&keys, std::slice::from_ref(&query.text), None, None);

        let mut ordered: Vec<Vec<ScoredEntity>> = Vec::new();
        let mut used: HashSet<String> = HashSet::new();
        for (key, _) in scored {
            if let Some(context) = context_map.get(&key) {
                if used.insert(key) {
                    ordered.push(context.clone());
                }
            }
        }
        for key in keys {
            if !used.contains(&key) {
                ordered.push(context_map[&key].clone());
            }
        }

        ordered.truncate(self.config.entity_context.max_context_paths);
        ordered
    }
}

/// Depth-first walk emitting only maximal paths: a context is produced at
/// each leaf whose entity survived admission. Entities that were filtered
/// out leave a gap but do not stop the walk.
fn walk(
    adjacency: &Adjacency,
    id: &str,
    known: &HashMap<String, ScoredEntity>,
    path: &mut Vec<ScoredEntity>,
    on_path: &mut HashSet<String>,
    out: &mut Vec<Vec<ScoredEntity>>,
) {
    if !on_path.insert(id.to_string()) {
        return;
    }

    let is_known = known.contains_key(id);
    if is_known {
        path.push(known[id].clone());
    }

    let children: Vec<&String> = adjacency
        .get(id)
        .map(|c| c.iter().filter(|c| !on_path.contains(*c)).collect())
        .unwrap_or_default();

    if children.is_empty() {
        if is_known && !path.is_empty() {
            out.push(path.clone());
        }
    } else {
        for child in children {
            walk(adjacency, child, known, path, on_path, out);
        }
    }

    if is_known {
        path.pop();
    }
    on_path.remove(id);
}
