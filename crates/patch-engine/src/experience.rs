//! Proposal outcome history.
//!
//! Records whether autonomous proposals were accepted or rejected so the
//! next proposal prompt can steer away from recently rejected categories.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::PatchError;

/// How many rejected categories the avoid-list remembers.
const AVOID_LIST_CAP: usize = 3;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ExperienceRecord {
    pub last_proposal_type: Option<String>,
    pub rejected_count: u32,
    /// Most recently rejected categories, newest last, capped.
    pub avoid_list: Vec<String>,
    pub next_wakeup: Option<DateTime<Utc>>,
}

/// Disk-backed experience record. Saved after every proposal outcome.
#[derive(Debug)]
pub struct ExperienceMemory {
    path: PathBuf,
    record: ExperienceRecord,
}

impl ExperienceMemory {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let record = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(?path, %err, "experience record corrupt, starting fresh");
                ExperienceRecord::default()
            }),
            Err(_) => ExperienceRecord::default(),
        };
        Self { path, record }
    }

    pub fn record(&self) -> &ExperienceRecord {
        &self.record
    }

    pub fn avoid_list(&self) -> &[String] {
        &self.record.avoid_list
    }

    pub fn record_accept(&mut self, proposal_type: &str) -> Result<(), PatchError> {
        self.record.last_proposal_type = Some(proposal_type.to_string());
        self.save()
    }

    pub fn record_reject(&mut self, proposal_type: &str) -> Result<(), PatchError> {
        self.record.last_proposal_type = Some(proposal_type.to_string());
        self.record.rejected_count += 1;
        self.record
            .avoid_list
            .retain(|entry| entry != proposal_type);
        self.record.avoid_list.push(proposal_type.to_string());
        let overflow = self.record.avoid_list.len().saturating_sub(AVOID_LIST_CAP);
        if overflow > 0 {
            self.record.avoid_list.drain(..overflow);
        }
        self.save()
    }

    pub fn set_next_wakeup(&mut self, at: DateTime<Utc>) -> Result<(), PatchError> {
        self.record.next_wakeup = Some(at);
        self.save()
    }

    fn save(&self) -> Result<(), PatchError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.record)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}
