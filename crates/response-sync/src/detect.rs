//! The completion race as a pure state machine.
//!
//! One `Detector` instance lives for one send. Each poll of the reply
//! block is fed to `observe`; the first detector to fire wins:
//!
//! 1. envelope-complete: both anchors present in order.
//! 2. envelope-truncated: start anchor present, text stable for the
//!    threshold, end anchor never arrived.
//! 3. fallback-diff: no anchors at all, text stable, differs from the
//!    pre-send baseline and is not the instruction echoed back.
//!
//! Timeouts are the polling loop's concern, not the detector's. Keeping
//! this free of the browser lets the race be tested with plain strings.

use tracing::debug;

use crate::envelope::{Envelope, FORMAT_PREAMBLE};

/// Which detector declared the reply complete.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompletionMode {
    EnvelopeComplete,
    EnvelopeTruncated,
    FallbackDiff,
    /// System/priming sends settle on a fixed delay and carry no payload.
    SystemSettle,
}

#[derive(Clone, Debug)]
pub struct Reply {
    pub text: String,
    pub truncated: bool,
    pub mode: CompletionMode,
}

pub struct Detector<'a> {
    envelope: &'a Envelope,
    /// Last rendered block before the send; the diff fallback compares
    /// against this.
    baseline: Option<String>,
    stability_threshold: usize,
    last_seen: Option<String>,
    stable_polls: usize,
}

impl<'a> Detector<'a> {
    pub fn new(envelope: &'a Envelope, baseline: Option<String>, stability_threshold: usize) -> Self {
        Self {
            envelope,
            baseline,
            stability_threshold,
            last_seen: None,
            stable_polls: 0,
        }
    }

    /// Feed one poll of the reply block. `None` means no block rendered
    /// yet. Returns the finished reply once a detector fires.
    pub fn observe(&mut self, block: Option<&str>) -> Option<Reply> {
        let block = match block {
            Some(b) => b,
            None => {
                self.last_seen = None;
                self.stable_polls = 0;
                return None;
            }
        };

        // Anchors honored: wins immediately, no stability needed.
        if let Some(payload) = self.envelope.extract_complete(block) {
            debug!("envelope complete");
            return Some(Reply {
                text: self.envelope.scrub(&payload),
                truncated: false,
                mode: CompletionMode::EnvelopeComplete,
            });
        }

        if self.last_seen.as_deref() == Some(block) {
            self.stable_polls += 1;
        } else {
            self.stable_polls = 0;
            self.last_seen = Some(block.to_string());
        }
        let stable = self.stable_polls >= self.stability_threshold;

        if block.contains(&self.envelope.start_tag) {
            if stable {
                debug!("start anchor present, end never arrived; flagging truncated");
                let payload = self.envelope.extract_truncated(block)?;
                return Some(Reply {
                    text: self.envelope.scrub(&payload),
                    truncated: true,
                    mode: CompletionMode::EnvelopeTruncated,
                });
            }
            return None;
        }

        // No anchors anywhere: degraded mode for a drifted UI. Require a
        // stabilized block that is new content, not the baseline and not
        // the instruction echoed back.
        if stable
            && self.baseline.as_deref() != Some(block)
            && !block.contains(FORMAT_PREAMBLE)
        {
            debug!("no anchors; accepting stabilized diff as the reply");
            return Some(Reply {
                text: self.envelope.scrub(block),
                truncated: false,
                mode: CompletionMode::FallbackDiff,
            });
        }
        None
    }
}
