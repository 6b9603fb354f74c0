//! Error types for the browser session layer

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    /// The browser could not be launched or attached after the bounded
    /// retry loop. The session is unusable.
    #[error("browser unavailable: {0}")]
    Unavailable(String),

    #[error("CDP error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("remote debugging endpoint error: {0}")]
    Remote(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
