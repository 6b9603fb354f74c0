//! Table-driven risk classification with a deny-first override order.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use golem_core_types::{ActionIntent, RiskAssessment, RiskTier};
use regex::RegexSet;
use tracing::{debug, warn};

use crate::errors::GateError;

/// Policy inputs. Defaults cover the shipped behavior; every field is
/// overridable from configuration.
#[derive(Clone, Debug)]
pub struct PolicyConfig {
    /// Default tier per intent kind. Missing kinds fall back to Strict.
    pub default_tiers: HashMap<String, RiskTier>,
    /// Base tokens that downgrade a command to Auto.
    pub allow_list: Vec<String>,
    /// Regexes over the whole command string. A match is always Blocked,
    /// evaluated before the allow-list.
    pub deny_patterns: Vec<String>,
    /// Regexes that force a command up to Strict confirmation. Evaluated
    /// after the deny patterns and before the allow-list, so a matching
    /// command always reaches the user as a prompt, never as Auto.
    pub caution_patterns: Vec<String>,
    /// Directory bounding every file-type directive.
    pub sandbox_root: PathBuf,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let mut default_tiers = HashMap::new();
        for (kind, tier) in [
            ("exec_shell", RiskTier::Ask),
            ("install", RiskTier::Ask),
            ("read_file", RiskTier::Ask),
            ("write_file", RiskTier::Strict),
            ("request_tool", RiskTier::Auto),
            ("multi_agent", RiskTier::Ask),
            ("schedule", RiskTier::Ask),
        ] {
            default_tiers.insert(kind.to_string(), tier);
        }
        Self {
            default_tiers,
            allow_list: [
                "ls", "pwd", "cat", "echo", "date", "whoami", "uname", "df", "free", "uptime",
                "which",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            deny_patterns: [
                // Filesystem wipes: deletes aimed at the root, the home
                // directory, or a bare wildcard. A delete scoped to a
                // named target falls through to the confirmation tiers.
                r"^\s*rm\s+(-[a-zA-Z]*\s+)*(/\*|/|~|\$HOME|\*)\s*$",
                r"\brm\s+(-[a-zA-Z]+\s+)+(/\*|/|~|\$HOME|\*)\s*$",
                // Fork bomb.
                r":\(\)\s*\{.*\}\s*;\s*:",
                // Raw device writes and reformatting.
                r"\bdd\b.*\bof=/dev/",
                r"\bmkfs(\.[a-z0-9]+)?\b",
                r">\s*/dev/sd",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            caution_patterns: [
                // Recursive deletes of anything.
                r"\brm\s+-[a-zA-Z]*r",
                // Recursive ownership or permission changes.
                r"\b(chmod|chown)\s+(-[a-zA-Z]*\s+)*-?R\b",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            sandbox_root: PathBuf::from("./workspace"),
        }
    }
}

/// Maps one intent to a policy tier.
pub struct RiskClassifier {
    config: PolicyConfig,
    deny_set: RegexSet,
    caution_set: RegexSet,
    sandbox_root: PathBuf,
}

impl RiskClassifier {
    pub fn new(config: PolicyConfig) -> Result<Self, GateError> {
        let deny_set = RegexSet::new(&config.deny_patterns)
            .map_err(|err| GateError::InvalidPolicy(format!("bad deny pattern: {err}")))?;
        let caution_set = RegexSet::new(&config.caution_patterns)
            .map_err(|err| GateError::InvalidPolicy(format!("bad caution pattern: {err}")))?;
        let sandbox_root = absolutize(&config.sandbox_root);
        Ok(Self {
            config,
            deny_set,
            caution_set,
            sandbox_root,
        })
    }

    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox_root
    }

    /// Assess one intent. Order of overrides is fixed contract:
    /// deny-pattern block first, then caution escalation, then allow-list
    /// downgrade, then the sandbox check for path intents, then the
    /// kind's default tier.
    pub fn assess(&self, intent: &ActionIntent) -> RiskAssessment {
        if let Some(cmd) = command_text(intent) {
            if self.deny_set.is_match(cmd) {
                warn!(cmd, "command matched deny pattern");
                return RiskAssessment::new(
                    RiskTier::Blocked,
                    "command matches a destructive deny pattern",
                );
            }
            if self.caution_set.is_match(cmd) {
                debug!(cmd, "command matched caution pattern");
                return RiskAssessment::new(
                    RiskTier::Strict,
                    "command matches a caution pattern",
                );
            }
            if let Some(base) = base_token(cmd) {
                if self.config.allow_list.iter().any(|a| a == base) {
                    return RiskAssessment::new(
                        RiskTier::Auto,
                        format!("`{base}` is on the safe allow-list"),
                    );
                }
            }
        }

        if let Some(path) = intent.path() {
            return match resolve_in_sandbox(&self.sandbox_root, path) {
                Some(resolved) => {
                    let tier = self.default_tier(intent);
                    debug!(path, resolved = %resolved.display(), %tier, "path resolved in sandbox");
                    RiskAssessment::new(tier, format!("{} inside sandbox", intent.kind()))
                        .with_resolved_path(resolved)
                }
                None => {
                    warn!(path, "path escapes the sandbox root");
                    RiskAssessment::new(
                        RiskTier::Blocked,
                        format!("path `{path}` escapes the sandbox root (jailbreak)"),
                    )
                }
            };
        }

        let tier = self.default_tier(intent);
        RiskAssessment::new(tier, format!("default tier for `{}`", intent.kind()))
    }

    fn default_tier(&self, intent: &ActionIntent) -> RiskTier {
        match intent {
            // Unknown kinds confirm with the strongest warning.
            ActionIntent::Unrecognized { .. } => RiskTier::Strict,
            ActionIntent::Skill { name, .. } => self
                .config
                .default_tiers
                .get(&format!("skill:{name}"))
                .copied()
                .unwrap_or(RiskTier::Strict),
            other => self
                .config
                .default_tiers
                .get(other.kind())
                .copied()
                .unwrap_or(RiskTier::Strict),
        }
    }
}

fn command_text(intent: &ActionIntent) -> Option<&str> {
    match intent {
        ActionIntent::ExecShell { cmd, .. } => Some(cmd.as_str()),
        ActionIntent::Install { tool, .. } => Some(tool.as_str()),
        _ => None,
    }
}

fn base_token(cmd: &str) -> Option<&str> {
    cmd.split_whitespace().next()
}

/// Resolve `path` against the sandbox root, lexically. Returns `None` when
/// the normalized result leaves the root. Lexical (not canonical) on
/// purpose: the target may not exist yet, and symlinked roots still
/// compare against their own prefix.
fn resolve_in_sandbox(root: &Path, path: &str) -> Option<PathBuf> {
    let joined = {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            root.join(candidate)
        }
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Prefix(p) => normalized.push(p.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    if normalized.starts_with(root) {
        Some(normalized)
    } else {
        None
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
