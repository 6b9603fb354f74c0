//! Error types for reply synchronization

use std::time::Duration;

use locator_heal::LocatorRole;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The stored selector matched nothing and self-healing could not
    /// produce a working replacement within its attempt bound.
    #[error("no usable selector for the {} role", .0.name())]
    LocatorNotFound(LocatorRole),

    /// The input element was found but rejected programmatic insertion.
    #[error("input element rejected text insertion")]
    InsertRejected,

    /// Browser failure while inserting or submitting the message. The
    /// interface likely shifted mid-turn, so this retries like a stale
    /// locator rather than propagating.
    #[error("interaction with the input element failed: {0}")]
    Interaction(#[source] browser_session::BrowserError),

    /// No completion detector fired within the configured ceiling.
    #[error("no completion signal within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Browser(#[from] browser_session::BrowserError),

    #[error(transparent)]
    Heal(#[from] locator_heal::HealError),
}

impl SyncError {
    /// Interaction errors get one response-role heal plus a full resend;
    /// anything else propagates immediately.
    pub fn is_interaction(&self) -> bool {
        matches!(
            self,
            SyncError::LocatorNotFound(_)
                | SyncError::InsertRejected
                | SyncError::Interaction(_)
        )
    }
}
