//! Error types for the locator system

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HealError {
    #[error("failed to read locator store: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse locator store: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("repair model request failed: {0}")]
    Model(#[from] reqwest::Error),
}

impl HealError {
    /// Quota and auth failures are the signal to rotate to the next key.
    pub fn should_rotate(status: reqwest::StatusCode) -> bool {
        matches!(status.as_u16(), 401 | 403 | 429)
    }
}
