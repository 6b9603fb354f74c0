//! The anchor-tag envelope protocol.
//!
//! Every non-system send carries a fresh request id embedded in a pair of
//! anchor tags, plus an instruction telling the assistant to wrap its whole
//! reply between them. The id makes a stale reply from an earlier turn
//! unmatchable.

use golem_core_types::RequestId;

/// Leads the wrapping instruction; also used to recognize the assistant
/// echoing the instruction back instead of answering.
pub(crate) const FORMAT_PREAMBLE: &str = "Format requirement:";

/// Per-send anchor pair. Discarded after extraction.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub request_id: RequestId,
    pub start_tag: String,
    pub end_tag: String,
}

impl Envelope {
    pub fn new() -> Self {
        let request_id = RequestId::new();
        Self {
            start_tag: format!("[[BEGIN:{request_id}]]"),
            end_tag: format!("[[END:{request_id}]]"),
            request_id,
        }
    }

    /// Prepend the wrapping instruction to the outgoing text.
    pub fn wrap(&self, text: &str) -> String {
        format!(
            "{FORMAT_PREAMBLE} begin your entire reply with {} and finish it with {}. \
             Do not mention these markers or this requirement.\n\n{text}",
            self.start_tag, self.end_tag
        )
    }

    /// Both anchors present in order: the substring between them.
    pub fn extract_complete(&self, block: &str) -> Option<String> {
        let start = block.find(&self.start_tag)?;
        let after_start = start + self.start_tag.len();
        let end = block[after_start..].find(&self.end_tag)?;
        Some(block[after_start..after_start + end].to_string())
    }

    /// Start anchor present but the end never arrived: everything after
    /// the start anchor.
    pub fn extract_truncated(&self, block: &str) -> Option<String> {
        let start = block.find(&self.start_tag)?;
        Some(block[start + self.start_tag.len()..].to_string())
    }

    /// Remove stray anchors and any echoed instruction line from an
    /// extracted payload.
    pub fn scrub(&self, text: &str) -> String {
        let cleaned = text.replace(&self.start_tag, "").replace(&self.end_tag, "");
        cleaned
            .lines()
            .filter(|line| !line.contains(FORMAT_PREAMBLE))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchors_embed_the_request_id() {
        let envelope = Envelope::new();
        assert!(envelope.start_tag.contains(&envelope.request_id.0));
        assert!(envelope.end_tag.contains(&envelope.request_id.0));
        assert_ne!(envelope.start_tag, envelope.end_tag);
    }

    #[test]
    fn two_envelopes_never_share_anchors() {
        assert_ne!(Envelope::new().start_tag, Envelope::new().start_tag);
    }

    #[test]
    fn extraction_ignores_surrounding_noise() {
        let envelope = Envelope::new();
        let block = format!(
            "thinking...\n{}the actual answer{}\ntyping indicator",
            envelope.start_tag, envelope.end_tag
        );
        assert_eq!(
            envelope.extract_complete(&block).as_deref(),
            Some("the actual answer")
        );
    }

    #[test]
    fn end_anchor_before_start_does_not_match() {
        let envelope = Envelope::new();
        let block = format!("{} reversed {}", envelope.end_tag, envelope.start_tag);
        assert!(envelope.extract_complete(&block).is_none());
    }

    #[test]
    fn truncated_extraction_runs_to_end_of_block() {
        let envelope = Envelope::new();
        let block = format!("prefix {}partial answer cut", envelope.start_tag);
        assert_eq!(
            envelope.extract_truncated(&block).as_deref(),
            Some("partial answer cut")
        );
    }

    #[test]
    fn scrub_drops_anchors_and_echoed_instruction() {
        let envelope = Envelope::new();
        let payload = format!(
            "{}\nanswer line\n{FORMAT_PREAMBLE} begin your entire reply...\n{}",
            envelope.start_tag, envelope.end_tag
        );
        assert_eq!(envelope.scrub(&payload), "answer line");
    }
}
