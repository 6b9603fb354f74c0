//! Chromium session ownership.
//!
//! One `BrowserSession` owns one browser instance and one active tab. It
//! attaches to an already-running browser over remote debugging when an
//! endpoint is configured, otherwise launches its own with the configured
//! profile directory, recovering from stale singleton locks with a bounded
//! relaunch loop.

mod errors;
mod session;

pub use errors::BrowserError;
pub use session::{clean_stale_locks, extract_ws_url, BrowserSession, SessionConfig};
