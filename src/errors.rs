//! Top-level error type for the engine

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Browser(#[from] browser_session::BrowserError),

    #[error(transparent)]
    Sync(#[from] response_sync::SyncError),

    #[error(transparent)]
    Gate(#[from] action_gate::GateError),

    #[error(transparent)]
    Command(#[from] command_exec::CommandError),

    #[error(transparent)]
    Patch(#[from] patch_engine::PatchError),

    #[error(transparent)]
    Heal(#[from] locator_heal::HealError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
