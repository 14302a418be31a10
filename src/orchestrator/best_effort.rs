use crate::error::AppResult;
use crate::metrics::{Metrics, Operation};
use std::future::Future;

/// Await a side effect whose failure must never reach the caller
///
/// Failures are logged with the operation name and counted in metrics.
/// Returns whether the call succeeded.
pub async fn best_effort<F>(operation: Operation, metrics: Option<&Metrics>, call: F) -> bool
where
    F: Future<Output = AppResult<()>>,
{
    match call.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                operation = operation.as_str(),
                error_kind = %e.kind(),
                error = %e,
                "Best-effort operation failed, continuing"
            );
            if let Some(metrics) = metrics {
                metrics.best_effort_failure(operation);
            }
            false
        }
    }
}
