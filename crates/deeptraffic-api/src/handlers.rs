//! Request handlers.

pub mod detect;
pub mod explain;
pub mod health;
pub mod model_info;
pub mod streams;

pub use detect::*;
pub use explain::*;
pub use health::*;
pub use model_info::*;
pub use streams::*;

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use deeptraffic_vision::{CommitGate, VisionResult};

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Run a CPU-bound inference job on the blocking pool, bounded by `timeout`.
///
/// The job receives a [`CommitGate`]. On timeout the gate is abandoned and
/// the caller gets a 504 right away; the job keeps running on its thread but
/// can no longer commit tracker state. If the job committed just before the
/// deadline, its result is awaited and returned instead.
pub(crate) async fn run_inference<T, F>(operation: &'static str, timeout: Duration, job: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&CommitGate) -> VisionResult<T> + Send + 'static,
{
    let gate = Arc::new(CommitGate::new());
    let job_gate = Arc::clone(&gate);
    let mut handle = tokio::task::spawn_blocking(move || job(&job_gate));

    let joined = match tokio::time::timeout(timeout, &mut handle).await {
        Ok(joined) => joined,
        Err(_) if gate.try_abandon() => {
            warn!(operation, timeout_ms = timeout.as_millis() as u64, "Inference timed out");
            metrics::record_inference_timeout(operation);
            return Err(ApiError::Timeout(timeout));
        }
        Err(_) => handle.await,
    };

    match joined {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ApiError::internal(format!("{} task failed: {}", operation, e))),
    }
}
