//! Error types for the gate layer

use golem_core_types::TaskId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    /// The referenced pending task does not exist or was already consumed
    /// by an earlier approve/deny.
    #[error("stale or unknown task id: {0}")]
    StaleTask(TaskId),

    #[error("invalid policy configuration: {0}")]
    InvalidPolicy(String),
}
