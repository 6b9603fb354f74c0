//! Golem engine library.
//!
//! Wires the workspace layers into the orchestrator: browser session,
//! reply synchronization, intent gating, command execution and the
//! self-patch engine, behind a `ChatPort` that platform adapters
//! implement.

pub mod autonomy;
pub mod config;
pub mod errors;
pub mod logbook;
pub mod orchestrator;
pub mod port;
pub mod skills;

pub use config::EngineConfig;
pub use errors::EngineError;
pub use orchestrator::Orchestrator;
pub use port::{ChatPort, Outbound};
