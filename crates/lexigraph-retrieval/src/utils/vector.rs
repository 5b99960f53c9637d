//! Vector-store seeding helpers.

use std::collections::VecDeque;

use serde_json::Value;
use tracing::debug;

use lexigraph_core::config::RetrievalConfig;
use lexigraph_core::error::CoreResult;
use lexigraph_core::metadata::FilterConfig;
use lexigraph_core::model::SearchQuery;
use lexigraph_core::store::VectorStore;

/// Fetch top similarity hits from a named index, spread across sources.
///
/// With a diversity factor above one, the index is over-fetched by that
/// factor and hits are then taken round-robin per source, so a single
/// document cannot monopolize the seed set.
pub async fn get_diverse_vss_elements(
    index_name: &str,
    query: &SearchQuery,
    vector_store: &dyn VectorStore,
    config: &RetrievalConfig,
    filter: Option<&FilterConfig>,
) -> CoreResult<Vec<Value>> {
    let index = vector_store.get_index(index_name)?;

    if config.vss_diversity_factor < 1 {
        return index.top_k(query, config.vss_top_k, filter).await;
    }

    let over_fetch = config.vss_top_k * config.vss_diversity_factor;
    let elements = index.top_k(query, over_fetch, filter).await?;

    // Queue per source, in first-seen order, then round-robin.
    let mut source_order: Vec<String> = Vec::new();
    let mut per_source: std::collections::HashMap<String, VecDeque<Value>> =
        std::collections::HashMap::new();
    for element in elements {
        let source_id = element
            .pointer("/source/sourceId")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if !per_source.contains_key(&source_id) {
            source_order.push(source_id.clone());
        }
        per_source.entry(source_id).or_default().push_back(element);
    }

    let mut queues: VecDeque<VecDeque<Value>> = source_order
        .into_iter()
        .filter_map(|id| per_source.remove(&id))
        .collect();

    let mut diverse = Vec::new();
    while let Some(mut queue) = queues.pop_front() {
        if diverse.len() >= config.vss_top_k {
            break;
        }
        if let Some(element) = queue.pop_front() {
            diverse.push(element);
        }
        if !queue.is_empty() {
            queues.push_back(queue);
        }
    }

    debug!(
        index = index_name,
        count = diverse.len(),
        "diverse vector hits selected"
    );

    Ok(diverse)
}
