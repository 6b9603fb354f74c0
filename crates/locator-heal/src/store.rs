//! Persisted role → selector mapping.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::HealError;

/// The three element roles the engine interacts with.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorRole {
    Input,
    Submit,
    Response,
}

impl LocatorRole {
    /// Description handed to the repair model when this role breaks.
    pub fn description(&self) -> &'static str {
        match self {
            LocatorRole::Input => "the chat input box (usually a contenteditable div or textarea)",
            LocatorRole::Submit => "the send/submit button for the chat input",
            LocatorRole::Response => "the container holding one assistant reply bubble",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LocatorRole::Input => "input",
            LocatorRole::Submit => "submit",
            LocatorRole::Response => "response",
        }
    }
}

/// Selector map. Always exactly these three keys; defaults cover the
/// current shape of the remote interface.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LocatorMap {
    pub input: String,
    pub submit: String,
    pub response: String,
}

impl Default for LocatorMap {
    fn default() -> Self {
        Self {
            input: "div[contenteditable=\"true\"]".to_string(),
            submit: "button[aria-label=\"Send message\"]".to_string(),
            response: "message-content".to_string(),
        }
    }
}

impl LocatorMap {
    pub fn get(&self, role: LocatorRole) -> &str {
        match role {
            LocatorRole::Input => &self.input,
            LocatorRole::Submit => &self.submit,
            LocatorRole::Response => &self.response,
        }
    }

    pub fn set(&mut self, role: LocatorRole, selector: String) {
        match role {
            LocatorRole::Input => self.input = selector,
            LocatorRole::Submit => self.submit = selector,
            LocatorRole::Response => self.response = selector,
        }
    }
}

/// Disk-backed store for the locator map. Loaded once at startup, written
/// back after every heal.
#[derive(Debug)]
pub struct LocatorStore {
    path: PathBuf,
    map: LocatorMap,
}

impl LocatorStore {
    /// Load from `path`, falling back to defaults when the file is missing
    /// or unreadable. A corrupt store is not fatal: the defaults plus the
    /// self-heal path recover it.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<LocatorMap>(&raw) {
                Ok(map) => map,
                Err(err) => {
                    warn!(?path, %err, "locator store corrupt, using defaults");
                    LocatorMap::default()
                }
            },
            Err(_) => LocatorMap::default(),
        };
        Self { path, map }
    }

    pub fn map(&self) -> &LocatorMap {
        &self.map
    }

    pub fn selector(&self, role: LocatorRole) -> &str {
        self.map.get(role)
    }

    /// Replace one role's selector and persist the full map.
    pub fn update(&mut self, role: LocatorRole, selector: String) -> Result<(), HealError> {
        info!(role = role.name(), %selector, "locator updated");
        self.map.set(role, selector);
        self.save()
    }

    fn save(&self) -> Result<(), HealError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.map)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
