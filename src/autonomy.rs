//! Self-improvement proposal round.
//!
//! On a long-period timer the orchestrator asks the assistant for one
//! concrete improvement to its own files, biased away from recently
//! rejected categories, and routes the answer through the patch engine.
//! This module owns the prompt and the proposal format; the orchestrator
//! owns scheduling and delivery.

use std::path::PathBuf;

use patch_engine::DiffFragment;
use serde::Deserialize;
use tracing::debug;

/// One proposed patch, as the assistant must format it.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PatchProposal {
    /// Category label fed to the experience memory (e.g. "logging",
    /// "retry-tuning").
    pub kind: String,
    /// File the fragments apply to.
    pub target: PathBuf,
    pub fragments: Vec<DiffFragment>,
}

/// Build the proposal request, steering away from the avoid-list.
pub fn proposal_prompt(avoid: &[String]) -> String {
    let mut prompt = String::from(
        "Propose exactly one small, concrete improvement to your own supporting files. \
         Reply with a single JSON object: {\"kind\": \"<category>\", \"target\": \"<file path>\", \
         \"fragments\": [{\"search\": \"<exact existing text>\", \"replace\": \"<new text>\"}]}. \
         The search text must appear verbatim in the target file.",
    );
    if !avoid.is_empty() {
        prompt.push_str(&format!(
            " Recent proposals in these categories were rejected, pick something else: {}.",
            avoid.join(", ")
        ));
    }
    prompt
}

/// Pull a proposal out of the reply: fenced ```json block first, then the
/// outermost brace span. Malformed content is simply no proposal.
pub fn parse_proposal(reply: &str) -> Option<PatchProposal> {
    if let Some(block) = fenced_block(reply) {
        if let Ok(proposal) = serde_json::from_str::<PatchProposal>(block) {
            return validate(proposal);
        }
    }
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<PatchProposal>(&reply[start..=end]) {
        Ok(proposal) => validate(proposal),
        Err(err) => {
            debug!(%err, "reply contained no parseable proposal");
            None
        }
    }
}

fn validate(proposal: PatchProposal) -> Option<PatchProposal> {
    if proposal.kind.trim().is_empty()
        || proposal.target.as_os_str().is_empty()
        || proposal.fragments.is_empty()
    {
        return None;
    }
    Some(proposal)
}

fn fenced_block(reply: &str) -> Option<&str> {
    let fence_start = reply.find("```")?;
    let after_fence = &reply[fence_start + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let fence_end = body.find("```")?;
    Some(body[..fence_end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_the_avoided_categories() {
        let prompt = proposal_prompt(&["logging".to_string(), "retries".to_string()]);
        assert!(prompt.contains("logging, retries"));

        let bare = proposal_prompt(&[]);
        assert!(!bare.contains("rejected"));
    }

    #[test]
    fn fenced_proposal_parses() {
        let reply = "Here is my idea:\n```json\n{\"kind\": \"logging\", \"target\": \"skills/notes.txt\", \"fragments\": [{\"search\": \"old\", \"replace\": \"new\"}]}\n```\nthanks";
        let proposal = parse_proposal(reply).unwrap();
        assert_eq!(proposal.kind, "logging");
        assert_eq!(proposal.target, PathBuf::from("skills/notes.txt"));
        assert_eq!(proposal.fragments.len(), 1);
    }

    #[test]
    fn unfenced_object_parses_from_the_brace_span() {
        let reply = "I suggest {\"kind\": \"docs\", \"target\": \"skills/help.txt\", \"fragments\": [{\"search\": \"a\", \"replace\": \"b\"}]} as the change.";
        assert!(parse_proposal(reply).is_some());
    }

    #[test]
    fn prose_and_empty_proposals_are_rejected() {
        assert!(parse_proposal("no structured content here").is_none());
        let empty =
            "{\"kind\": \"x\", \"target\": \"f\", \"fragments\": []}";
        assert!(parse_proposal(empty).is_none());
    }
}
