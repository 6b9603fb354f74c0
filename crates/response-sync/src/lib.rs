//! Reply synchronization over a non-cooperative chat UI.
//!
//! The remote assistant renders replies progressively inside a page we do
//! not control, with no event that says "done". Outgoing text is wrapped in
//! a uniquely tagged envelope and the reply block is polled, racing several
//! completion detectors: both anchors present, start anchor plus stability,
//! or a stabilized diff against the pre-send baseline when the assistant
//! drops the anchors entirely. Interaction failures trigger the locator
//! self-heal path and one full retry.

pub mod detect;
pub mod envelope;
pub mod errors;
pub mod sync;

pub use detect::{CompletionMode, Detector, Reply};
pub use envelope::Envelope;
pub use errors::SyncError;
pub use sync::{ChatSurface, ResponseSynchronizer, SyncConfig};
