//! Strictly sequential execution of async operations.
//!
//! Operation `n + 1` is not created until operation `n` has settled. Writes
//! against one shared document go through here so they cannot interleave.

use std::future::Future;

/// A batch that stopped part way through. Earlier operations are not undone.
#[derive(Debug)]
pub struct BatchFailure<E> {
    /// Operations that completed before the failure.
    pub completed: usize,
    /// Operations in the batch.
    pub total: usize,
    pub error: E,
}

/// Fold `items` through `step` one at a time, threading the state returned
/// by each step into the next. Returns the state produced by the last step.
pub async fn serialize_fold<S, I, F, Fut, E>(
    init: S,
    items: I,
    mut step: F,
) -> Result<S, BatchFailure<E>>
where
    I: IntoIterator,
    F: FnMut(S, I::Item) -> Fut,
    Fut: Future<Output = Result<S, E>>,
{
    let items: Vec<I::Item> = items.into_iter().collect();
    let total = items.len();
    let mut state = init;

    for (completed, item) in items.into_iter().enumerate() {
        state = step(state, item).await.map_err(|error| BatchFailure {
            completed,
            total,
            error,
        })?;
    }

    Ok(state)
}
