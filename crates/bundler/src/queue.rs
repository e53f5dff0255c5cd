//! Bounded-concurrency execution of independent async work.

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};

/// Runs `f` over every item with at most `limit` futures in flight.
/// Results come back in completion order.
///
/// The per-item futures are boxed so the caller's future stays `Send` when
/// they borrow from it.
pub async fn run_bounded<'a, I, F, T>(items: I, limit: usize, f: F) -> Vec<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> BoxFuture<'a, T>,
{
    // Building the (inert, unpolled) futures up front keeps the closure out
    // of the stream state, which otherwise trips rustc's higher-ranked
    // `Send` inference when the caller is spawned.
    let futures: Vec<BoxFuture<'a, T>> = items.into_iter().map(f).collect();
    stream::iter(futures)
        .buffer_unordered(limit.max(1))
        .collect()
        .await
}
