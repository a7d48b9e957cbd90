//! Bounded task group for fan-out points.
//!
//! Each fan-out spawns its own group rather than sharing a global pool, so
//! unrelated branches never head-of-line-block each other while total
//! outstanding work stays bounded.

use futures::stream::{self, StreamExt};
use futures::Future;

/// Runs `tasks` with at most `limit` in flight and waits for **all** of them
/// before returning. On failure the first error (in input order) is raised,
/// but only after every sibling has finished: dispatched remote work is never
/// orphaned and never cancelled mid-flight. Successful results come back in
/// input order.
pub async fn join_all<F, T, E>(limit: usize, tasks: Vec<F>) -> Result<Vec<T>, E>
where
    F: Future<Output = Result<T, E>>,
{
    let results: Vec<Result<T, E>> = stream::iter(tasks)
        .buffered(limit.max(1))
        .collect()
        .await;

    let mut values = Vec::with_capacity(results.len());
    let mut first_err = None;
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(e) if first_err.is_none() => first_err = Some(e),
            Err(_) => {}
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(values),
    }
}

/// Two-branch fan-out with heterogeneous result types. Both branches always
/// run to completion; the left branch's error wins when both fail.
pub async fn join_pair<FA, FB, A, B, E>(a: FA, b: FB) -> Result<(A, B), E>
where
    FA: Future<Output = Result<A, E>>,
    FB: Future<Output = Result<B, E>>,
{
    let (a, b) = futures::join!(a, b);
    Ok((a?, b?))
}
