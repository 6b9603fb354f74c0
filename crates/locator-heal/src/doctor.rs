//! Model-assisted locator repair.
//!
//! When a stored selector stops matching, the current page markup is sent
//! to a repair model together with a description of the broken role. The
//! model's answer is sanitized hard: these strings go straight back into
//! `querySelectorAll`, so fences, language tags and prose must never
//! survive.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::errors::HealError;
use crate::keys::KeyRing;
use crate::store::LocatorRole;

/// Upper bound on the markup snippet shipped to the repair model.
const MAX_MARKUP_CHARS: usize = 30_000;

/// Longest selector we will accept from the model.
const MAX_SELECTOR_LEN: usize = 200;

/// Seam for the repair model. The synchronizer only sees this trait, so
/// tests can substitute a canned doctor.
#[async_trait]
pub trait LocatorDoctor: Send + Sync {
    /// Derive a replacement selector for `role` from a markup snapshot.
    /// `None` means the model could not produce a usable locator.
    async fn diagnose(&self, markup: &str, role: LocatorRole)
        -> Result<Option<String>, HealError>;
}

/// Configuration for the HTTP-backed doctor.
#[derive(Clone, Debug)]
pub struct ModelDoctorConfig {
    /// Chat-completions style endpoint.
    pub endpoint: String,
    pub model: String,
}

/// Default doctor: an OpenAI-compatible chat endpoint with credential
/// rotation across the configured key ring.
pub struct ModelDoctor {
    client: Client,
    config: ModelDoctorConfig,
    keys: KeyRing,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl ModelDoctor {
    pub fn new(config: ModelDoctorConfig, keys: KeyRing) -> Self {
        Self {
            client: Client::new(),
            config,
            keys,
        }
    }

    fn build_prompt(markup: &str, role: LocatorRole) -> String {
        let snippet: String = markup.chars().take(MAX_MARKUP_CHARS).collect();
        format!(
            "A browser automation selector broke because the page changed.\n\
             Target element: {}.\n\
             Below is the current page markup (truncated).\n\
             Answer with exactly one CSS selector that matches the target.\n\
             No explanation, no code fences, only the selector.\n\n{}",
            role.description(),
            snippet
        )
    }

    async fn ask_model(&self, key: &str, prompt: &str) -> Result<reqwest::Response, HealError> {
        let body = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl LocatorDoctor for ModelDoctor {
    async fn diagnose(
        &self,
        markup: &str,
        role: LocatorRole,
    ) -> Result<Option<String>, HealError> {
        if self.keys.is_empty() {
            warn!("no repair credentials configured");
            return Ok(None);
        }

        let prompt = Self::build_prompt(markup, role);

        for attempt in 0..self.keys.len() {
            let key = match self.keys.current() {
                Some(key) => key.to_string(),
                None => break,
            };

            let response = self.ask_model(&key, &prompt).await?;
            let status = response.status();

            if HealError::should_rotate(status) {
                warn!(%status, attempt, "repair credential rejected, rotating");
                self.keys.rotate();
                continue;
            }
            if !status.is_success() {
                warn!(%status, "repair model returned an error status");
                return Ok(None);
            }

            let parsed: ChatResponse = response.json().await?;
            let answer = parsed
                .choices
                .first()
                .map(|c| c.message.content.as_str())
                .unwrap_or_default();
            debug!(role = role.name(), answer, "repair model answered");

            return Ok(sanitize_selector(answer));
        }

        warn!("all repair credentials exhausted");
        Ok(None)
    }
}

/// Strip the formatting artifacts models wrap answers in. Rejects anything
/// that still cannot be a selector afterwards.
pub fn sanitize_selector(raw: &str) -> Option<String> {
    let mut s = raw.trim().to_string();

    // Fenced block: keep the inside.
    if let Some(stripped) = s.strip_prefix("```") {
        s = stripped
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
            .to_string();
        if let Some(end) = s.find("```") {
            s.truncate(end);
        }
    }
    s = s.replace('`', "");

    // Leading language tag left over from a fence.
    for tag in ["css", "html", "json"] {
        if s.len() > tag.len() && s[..tag.len()].eq_ignore_ascii_case(tag) {
            let rest = &s[tag.len()..];
            if rest.starts_with(char::is_whitespace) || rest.starts_with('\n') {
                s = rest.to_string();
            }
        }
    }

    let s = s.trim().trim_matches('"').trim_matches('\'').trim();

    if s.is_empty() || s.len() > MAX_SELECTOR_LEN || s.contains('\n') {
        return None;
    }

    info!(selector = s, "sanitized repair selector");
    Some(s.to_string())
}
