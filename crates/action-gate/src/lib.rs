//! Intent extraction, risk classification and the approval queue.
//!
//! Everything between "a reply finished" and "a command may run" lives
//! here: pulling structured directives out of free-form reply text, mapping
//! each one to a policy tier, and holding multi-step sequences that need a
//! human decision.

pub mod errors;
pub mod parser;
pub mod policy;
pub mod queue;

pub use errors::GateError;
pub use parser::{extract_intents, Extraction};
pub use policy::{PolicyConfig, RiskClassifier};
pub use queue::{ApprovalQueue, PendingTask};
