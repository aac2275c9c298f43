//! Engine Errors
//!
//! Failures inside the engine are contained at two boundaries: scheduled
//! tasks (lifecycle callbacks, effect bodies, subscriber notifications) and
//! cleanup handles. A panic at either boundary is caught, converted into an
//! [`EngineError`], logged, and counted. It never reaches application code.
//!
//! The remaining variants are returned from the few entry points that can be
//! misused: addressing an identity that is no longer live, or draining a
//! scheduler that never settles.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::runtime::InstanceId;

/// Errors produced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A scheduled task or synchronous lifecycle callback panicked.
    #[error("task owned by {} panicked: {message}", display_owner(.owner))]
    TaskPanicked {
        owner: Option<InstanceId>,
        message: String,
    },

    /// A cleanup handle panicked while its owner was being torn down.
    #[error("cleanup for {owner} panicked: {message}")]
    CleanupPanicked { owner: InstanceId, message: String },

    /// The identity does not name a live instance.
    #[error("instance {0} is not live")]
    InstanceNotFound(InstanceId),

    /// The instance was rendered from a prebuilt description and has no
    /// view function to re-run.
    #[error("instance {0} has no view function to refresh")]
    NotRefreshable(InstanceId),

    /// Draining kept producing new batches.
    #[error("scheduler did not settle after {rounds} flushes")]
    Unsettled { rounds: usize },

    /// The configuration could not be parsed.
    #[error("invalid engine configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

fn display_owner(owner: &Option<InstanceId>) -> String {
    match owner {
        Some(id) => id.to_string(),
        None => "no instance".to_string(),
    }
}

/// Run `f`, turning a panic into its message.
pub(crate) fn catch_panic<R>(f: impl FnOnce() -> R) -> std::result::Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(&*payload))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
