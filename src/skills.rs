//! Prompt-text skill library.
//!
//! Skills are plain text files in a directory: the file stem is the skill
//! name, the content is the prompt injected when the assistant invokes it.
//! The catalog summary is advertised during session priming so the
//! assistant knows what it may call.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct SkillCatalog {
    skills: BTreeMap<String, String>,
}

impl SkillCatalog {
    /// Load every `.txt` file under `dir`. A missing directory is an empty
    /// catalog, not an error.
    pub fn load(dir: &Path) -> Self {
        let mut skills = BTreeMap::new();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => {
                debug!(dir = %dir.display(), "no skill directory; empty catalog");
                return Self::default();
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match fs::read_to_string(&path) {
                Ok(content) => {
                    skills.insert(name.to_string(), content);
                }
                Err(err) => warn!(path = %path.display(), %err, "unreadable skill file"),
            }
        }
        Self { skills }
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.skills.keys().map(String::as_str)
    }

    pub fn prompt(&self, name: &str) -> Option<&str> {
        self.skills.get(name).map(String::as_str)
    }

    /// One line per skill for the priming message: the name plus the first
    /// line of its prompt as a description.
    pub fn summary(&self) -> String {
        self.skills
            .iter()
            .map(|(name, content)| {
                let first_line = content.lines().next().unwrap_or("").trim();
                format!("- {name}: {first_line}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
