//! Bounded fork-join over per-segment work.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

/// Run `f` for every item with at most `max_concurrent` in flight.
///
/// Results come back in input order. A failing item never cancels its
/// siblings; each result is returned as produced.
pub async fn fork_join<I, T, F, Fut>(items: I, max_concurrent: usize, f: F) -> Vec<T>
where
    I: IntoIterator,
    F: Fn(I::Item) -> Fut,
    Fut: Future<Output = T>,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

    let futures = items.into_iter().map(|item| {
        let semaphore = Arc::clone(&semaphore);
        let task = f(item);
        async move {
            // The semaphore is never closed, so acquire cannot fail.
            let _permit = semaphore.acquire().await.ok();
            task.await
        }
    });

    join_all(futures).await
}
