//! Error types for the patch engine

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Fragment `index` matched neither literally nor with the
    /// whitespace-tolerant fallback. The whole candidate is aborted and
    /// the target stays untouched.
    #[error("fragment {index} has no match in the target")]
    NoMatch { index: usize },

    #[error("verification failed at {stage}: {detail}")]
    VerifyFailed { stage: String, detail: String },

    /// Only one candidate may be pending at a time.
    #[error("a patch candidate is already pending")]
    CandidatePending,

    #[error("no patch candidate is pending")]
    NoCandidate,

    #[error("verifier command error: {0}")]
    Command(#[from] command_exec::CommandError),
}
