//! Order-preserving bounded parallel map.

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Apply an async function to every item with at most `max_workers`
/// in flight at once.
///
/// Results come back in input order regardless of completion order, so
/// fan-out stages can rely on positional correspondence with their inputs.
pub async fn parallel_map<T, U, F, Fut>(items: Vec<T>, max_workers: usize, f: F) -> Vec<U>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = U>,
{
    stream::iter(items.into_iter().map(f))
        .buffered(max_workers.max(1))
        .collect()
        .await
}
