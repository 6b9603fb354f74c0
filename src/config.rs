//! Configuration surface for the whole engine.
//!
//! Layered sources: built-in defaults, then an optional config file, then
//! `GOLEM_*` environment variables. Sections convert into the per-crate
//! config structs so the layers stay decoupled from the file format.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use browser_session::SessionConfig;
use golem_core_types::RiskTier;
use patch_engine::PatchConfig;
use response_sync::SyncConfig;
use serde::Deserialize;

use crate::errors::EngineError;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub browser: BrowserSettings,
    pub repair: RepairSettings,
    pub sync: SyncSettings,
    pub policy: PolicySettings,
    pub command: CommandSettings,
    pub patch: PatchSettings,
    pub autonomy: AutonomySettings,
    pub log: LogSettings,
    pub chat: ChatSettings,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub profile_dir: PathBuf,
    pub remote_debug_url: Option<String>,
    pub headless: bool,
    pub start_url: String,
    pub launch_retries: u8,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        let base = SessionConfig::default();
        Self {
            profile_dir: base.profile_dir,
            remote_debug_url: base.remote_debug_url,
            headless: base.headless,
            start_url: base.start_url,
            launch_retries: base.launch_retries,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RepairSettings {
    /// OpenAI-compatible chat-completions endpoint for locator repair.
    pub endpoint: String,
    pub model: String,
    /// Credentials tried in rotation on quota/auth failures.
    pub api_keys: Vec<String>,
    /// Where the role → selector map is persisted.
    pub locator_path: PathBuf,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_keys: Vec::new(),
            locator_path: PathBuf::from("./golem_locators.json"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub poll_interval_ms: u64,
    pub stability_threshold: usize,
    pub ceiling_secs: u64,
    pub heal_attempts: usize,
    pub system_settle_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let base = SyncConfig::default();
        Self {
            poll_interval_ms: base.poll_interval.as_millis() as u64,
            stability_threshold: base.stability_threshold,
            ceiling_secs: base.ceiling.as_secs(),
            heal_attempts: base.heal_attempts,
            system_settle_secs: base.system_settle.as_secs(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    pub sandbox_root: PathBuf,
    /// When present, replaces the built-in allow-list entirely.
    pub allow_list: Option<Vec<String>>,
    /// When present, replaces the built-in deny patterns entirely.
    pub deny_patterns: Option<Vec<String>>,
    /// When present, replaces the built-in caution patterns entirely.
    pub caution_patterns: Option<Vec<String>>,
    /// Per-kind tier overrides merged over the built-in table.
    pub tiers: HashMap<String, RiskTier>,
    /// Shell template for approved installs; `{tool}` is substituted.
    pub install_command: String,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            sandbox_root: PathBuf::from("./workspace"),
            allow_list: None,
            deny_patterns: None,
            caution_patterns: None,
            tiers: HashMap::new(),
            install_command: "pip3 install --user {tool}".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    pub timeout_secs: u64,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PatchSettings {
    pub staging_dir: PathBuf,
    pub syntax_command: Option<String>,
    pub orchestrator_file: Option<PathBuf>,
    pub smoke_command: Option<String>,
    pub smoke_timeout_secs: u64,
    pub skills_dir: Option<PathBuf>,
    pub import_command: Option<String>,
    /// Where the experience record is persisted.
    pub experience_path: PathBuf,
}

impl Default for PatchSettings {
    fn default() -> Self {
        let base = PatchConfig::default();
        Self {
            staging_dir: base.staging_dir,
            syntax_command: base.syntax_command,
            orchestrator_file: base.orchestrator_file,
            smoke_command: base.smoke_command,
            smoke_timeout_secs: base.smoke_timeout.as_secs(),
            skills_dir: base.skills_dir,
            import_command: base.import_command,
            experience_path: PathBuf::from("./golem_experience.json"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AutonomySettings {
    pub enabled: bool,
    pub period_secs: u64,
    /// Channel that receives proposal notifications and patch buttons.
    pub admin_channel: String,
}

impl Default for AutonomySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            period_secs: 6 * 60 * 60,
            admin_channel: "admin".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub path: PathBuf,
    pub retention_hours: u64,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./golem_log.jsonl"),
            retention_hours: 24,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Replies longer than this are truncated for the channel; the full
    /// text stays in the interaction log.
    pub reply_limit: usize,
    /// Directory of prompt-text skill files advertised during priming.
    pub skills_dir: PathBuf,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            reply_limit: 3500,
            skills_dir: PathBuf::from("./skills"),
        }
    }
}

impl EngineConfig {
    /// Defaults, then the optional file, then `GOLEM_*` env overrides
    /// (`GOLEM_BROWSER__HEADLESS=true` style).
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, EngineError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()));
        } else {
            builder = builder.add_source(
                config::File::with_name("golem").required(false),
            );
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("GOLEM").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            profile_dir: self.browser.profile_dir.clone(),
            remote_debug_url: self.browser.remote_debug_url.clone(),
            headless: self.browser.headless,
            start_url: self.browser.start_url.clone(),
            launch_retries: self.browser.launch_retries,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            poll_interval: Duration::from_millis(self.sync.poll_interval_ms),
            stability_threshold: self.sync.stability_threshold,
            ceiling: Duration::from_secs(self.sync.ceiling_secs),
            heal_attempts: self.sync.heal_attempts,
            system_settle: Duration::from_secs(self.sync.system_settle_secs),
        }
    }

    pub fn policy_config(&self) -> action_gate::PolicyConfig {
        let mut policy = action_gate::PolicyConfig {
            sandbox_root: self.policy.sandbox_root.clone(),
            ..action_gate::PolicyConfig::default()
        };
        if let Some(allow) = &self.policy.allow_list {
            policy.allow_list = allow.clone();
        }
        if let Some(deny) = &self.policy.deny_patterns {
            policy.deny_patterns = deny.clone();
        }
        if let Some(caution) = &self.policy.caution_patterns {
            policy.caution_patterns = caution.clone();
        }
        for (kind, tier) in &self.policy.tiers {
            policy.default_tiers.insert(kind.clone(), *tier);
        }
        policy
    }

    pub fn patch_config(&self) -> PatchConfig {
        PatchConfig {
            staging_dir: self.patch.staging_dir.clone(),
            syntax_command: self.patch.syntax_command.clone(),
            orchestrator_file: self.patch.orchestrator_file.clone(),
            smoke_command: self.patch.smoke_command.clone(),
            smoke_timeout: Duration::from_secs(self.patch.smoke_timeout_secs),
            skills_dir: self.patch.skills_dir.clone(),
            import_command: self.patch.import_command.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.sync.poll_interval_ms, 500);
        assert_eq!(cfg.sync.stability_threshold, 5);
        assert_eq!(cfg.sync.ceiling_secs, 120);
        assert_eq!(cfg.log.retention_hours, 24);
        assert!(!cfg.autonomy.enabled);
    }

    #[test]
    fn tier_overrides_merge_over_the_builtin_table() {
        let mut cfg = EngineConfig::default();
        cfg.policy
            .tiers
            .insert("exec_shell".to_string(), RiskTier::Auto);

        let policy = cfg.policy_config();
        assert_eq!(policy.default_tiers["exec_shell"], RiskTier::Auto);
        // Untouched kinds keep their defaults.
        assert_eq!(policy.default_tiers["write_file"], RiskTier::Strict);
    }

    #[test]
    fn file_settings_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("golem.toml");
        std::fs::write(
            &path,
            "[browser]\nheadless = true\n\n[sync]\nceiling_secs = 30\n",
        )
        .unwrap();

        let cfg = EngineConfig::load(Some(&path)).unwrap();
        assert!(cfg.browser.headless);
        assert_eq!(cfg.sync.ceiling_secs, 30);
        // Untouched sections fall back to defaults.
        assert_eq!(cfg.sync.poll_interval_ms, 500);
    }
}
