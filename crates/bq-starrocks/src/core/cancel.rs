//! Cancellation of suspension points.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{LoadError, Result};

/// Run `fut` unless `cancel` fires first.
///
/// The cancelled branch is polled first so an already-cancelled token never
/// starts new work. On cancellation `fut` is dropped, which aborts any
/// in-flight statement it owns.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LoadError::Cancelled),
        res = fut => res,
    }
}
