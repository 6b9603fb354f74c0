//! Verified, rollback-safe deployment of AI-authored patches.
//!
//! A patch arrives as search/replace fragments against one target file.
//! The engine applies them to a staged copy (never the live file), verifies
//! the result, and only swaps it into place after explicit approval, with a
//! timestamped backup for rollback. Acceptance and rejection both feed the
//! experience memory that biases future proposals.

pub mod apply;
pub mod engine;
pub mod errors;
pub mod experience;

pub use apply::{apply_fragments, DiffFragment};
pub use engine::{PatchCandidate, PatchConfig, PatchEngine, RestartRequest};
pub use errors::PatchError;
pub use experience::{ExperienceMemory, ExperienceRecord};
