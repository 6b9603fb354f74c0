//! The synchronizer: one anchored send against the live page.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use browser_session::{BrowserError, BrowserSession};
use locator_heal::{LocatorDoctor, LocatorRole, LocatorStore};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::detect::{CompletionMode, Detector, Reply};
use crate::envelope::Envelope;
use crate::errors::SyncError;

/// Page operations the synchronizer needs. `BrowserSession` is the real
/// implementation; tests script a fake.
#[async_trait]
pub trait ChatSurface: Send + Sync {
    async fn exists(&self, selector: &str) -> Result<bool, BrowserError>;
    async fn insert_text(&self, selector: &str, text: &str) -> Result<bool, BrowserError>;
    async fn press_enter(&self, input_selector: &str) -> Result<(), BrowserError>;
    async fn last_block_text(&self, selector: &str) -> Result<Option<String>, BrowserError>;
    async fn markup(&self) -> Result<String, BrowserError>;
}

#[async_trait]
impl ChatSurface for BrowserSession {
    async fn exists(&self, selector: &str) -> Result<bool, BrowserError> {
        BrowserSession::exists(self, selector).await
    }
    async fn insert_text(&self, selector: &str, text: &str) -> Result<bool, BrowserError> {
        BrowserSession::insert_text(self, selector, text).await
    }
    async fn press_enter(&self, input_selector: &str) -> Result<(), BrowserError> {
        BrowserSession::press_enter(self, input_selector).await
    }
    async fn last_block_text(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        BrowserSession::last_block_text(self, selector).await
    }
    async fn markup(&self) -> Result<String, BrowserError> {
        BrowserSession::markup(self).await
    }
}

/// Tunable waits and bounds. The defaults match observed UI behavior; any
/// consistent monotonic choice works.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    /// Consecutive unchanged polls before "stopped changing" holds.
    pub stability_threshold: usize,
    /// Hard ceiling for one send.
    pub ceiling: Duration,
    /// Self-heal attempts per broken role before giving up.
    pub heal_attempts: usize,
    /// Settle delay after a system/priming send.
    pub system_settle: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            stability_threshold: 5,
            ceiling: Duration::from_secs(120),
            heal_attempts: 3,
            system_settle: Duration::from_secs(2),
        }
    }
}

pub struct ResponseSynchronizer<S: ChatSurface> {
    surface: S,
    store: LocatorStore,
    doctor: Arc<dyn LocatorDoctor>,
    config: SyncConfig,
}

impl<S: ChatSurface> ResponseSynchronizer<S> {
    pub fn new(
        surface: S,
        store: LocatorStore,
        doctor: Arc<dyn LocatorDoctor>,
        config: SyncConfig,
    ) -> Self {
        Self {
            surface,
            store,
            doctor,
            config,
        }
    }

    pub fn store(&self) -> &LocatorStore {
        &self.store
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Send one message and wait for the completed reply. An interaction
    /// failure gets one response-role heal and one full resend; a second
    /// failure propagates.
    pub async fn send(&mut self, text: &str, is_system: bool) -> Result<Reply, SyncError> {
        match self.attempt(text, is_system).await {
            Ok(reply) => Ok(reply),
            Err(err) if err.is_interaction() => {
                warn!(%err, "interaction failed; healing response role and retrying once");
                self.heal_role(LocatorRole::Response).await?;
                self.attempt(text, is_system).await
            }
            Err(err) => Err(err),
        }
    }

    async fn attempt(&mut self, text: &str, is_system: bool) -> Result<Reply, SyncError> {
        let envelope = Envelope::new();
        let outgoing = if is_system {
            text.to_string()
        } else {
            envelope.wrap(text)
        };

        let input_selector = self.ensure_selector(LocatorRole::Input).await?;
        let response_selector = self.store.selector(LocatorRole::Response).to_string();

        let baseline = if is_system {
            None
        } else {
            self.surface.last_block_text(&response_selector).await?
        };

        let accepted = self
            .surface
            .insert_text(&input_selector, &outgoing)
            .await
            .map_err(SyncError::Interaction)?;
        if !accepted {
            return Err(SyncError::InsertRejected);
        }
        self.surface
            .press_enter(&input_selector)
            .await
            .map_err(SyncError::Interaction)?;
        debug!(request_id = %envelope.request_id, "message submitted");

        if is_system {
            sleep(self.config.system_settle).await;
            return Ok(Reply {
                text: String::new(),
                truncated: false,
                mode: CompletionMode::SystemSettle,
            });
        }

        let mut detector = Detector::new(&envelope, baseline, self.config.stability_threshold);
        let started = Instant::now();
        loop {
            sleep(self.config.poll_interval).await;
            if started.elapsed() > self.config.ceiling {
                return Err(SyncError::Timeout(self.config.ceiling));
            }
            let block = self.surface.last_block_text(&response_selector).await?;
            if let Some(reply) = detector.observe(block.as_deref()) {
                info!(request_id = %envelope.request_id, mode = ?reply.mode, "reply complete");
                return Ok(reply);
            }
        }
    }

    /// Return a selector for `role` that currently matches, healing it a
    /// bounded number of times when the stored one has gone stale.
    async fn ensure_selector(&mut self, role: LocatorRole) -> Result<String, SyncError> {
        let selector = self.store.selector(role).to_string();
        if self.surface.exists(&selector).await? {
            return Ok(selector);
        }

        warn!(role = role.name(), %selector, "stored selector no longer matches");
        for attempt in 1..=self.config.heal_attempts {
            if let Some(healed) = self.heal_role(role).await? {
                if self.surface.exists(&healed).await? {
                    info!(role = role.name(), selector = %healed, attempt, "selector healed");
                    return Ok(healed);
                }
                debug!(role = role.name(), selector = %healed, attempt, "healed selector still matches nothing");
            }
        }
        Err(SyncError::LocatorNotFound(role))
    }

    /// One repair-model round for `role`; persists any replacement.
    async fn heal_role(&mut self, role: LocatorRole) -> Result<Option<String>, SyncError> {
        let markup = self.surface.markup().await?;
        match self.doctor.diagnose(&markup, role).await? {
            Some(selector) => {
                self.store.update(role, selector.clone())?;
                Ok(Some(selector))
            }
            None => Ok(None),
        }
    }
}
