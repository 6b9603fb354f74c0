//! Shared primitives for the Golem engine crates.
//!
//! Everything that crosses a crate boundary lives here: opaque ids, the
//! inbound chat event shape, the closed `ActionIntent` union, and the risk
//! tier model used by the classifier and the approval flow.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier bound to one synchronizer send. Embedded in the envelope
/// anchors, so a stale reply from an earlier turn can never match.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Short unique id; anchors stay readable inside the prompt.
    pub fn new() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(simple[..6].to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a queued approval task. Single use: consumed by the
/// first APPROVE/DENY that references it.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat channel identity, opaque to the engine; the platform adapter owns
/// its meaning.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sender identity as reported by the platform adapter.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SenderId(pub String);

/// One inbound event from a chat collaborator. Platform adapters translate
/// their native callback objects into this shape before it reaches the
/// orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ChatEvent {
    Message {
        text: String,
        sender: SenderId,
        channel: ChannelId,
    },
    /// Button press carrying an opaque `VERB:token` action id.
    Button { token: String, channel: ChannelId },
}

/// Structured action directive extracted from a finished reply.
///
/// Closed union: every recognized action kind has a variant, and anything
/// else lands in `Unrecognized` so the classifier can apply the strictest
/// tier instead of silently dropping it.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionIntent {
    ExecShell {
        cmd: String,
        reason: Option<String>,
    },
    Install {
        tool: String,
        reason: Option<String>,
    },
    ReadFile {
        path: String,
    },
    WriteFile {
        path: String,
        content: String,
    },
    RequestTool {
        tool: String,
        reason: Option<String>,
    },
    MultiAgent {
        preset: String,
        task: String,
    },
    Schedule {
        task: String,
        time: String,
    },
    Skill {
        name: String,
        args: serde_json::Value,
    },
    Unrecognized {
        kind: String,
        raw: serde_json::Value,
    },
}

impl ActionIntent {
    /// Stable kind label used for policy lookup and experience records.
    pub fn kind(&self) -> &str {
        match self {
            ActionIntent::ExecShell { .. } => "exec_shell",
            ActionIntent::Install { .. } => "install",
            ActionIntent::ReadFile { .. } => "read_file",
            ActionIntent::WriteFile { .. } => "write_file",
            ActionIntent::RequestTool { .. } => "request_tool",
            ActionIntent::MultiAgent { .. } => "multi_agent",
            ActionIntent::Schedule { .. } => "schedule",
            ActionIntent::Skill { name, .. } => name,
            ActionIntent::Unrecognized { .. } => "unrecognized",
        }
    }

    /// Path field, when the intent touches the filesystem.
    pub fn path(&self) -> Option<&str> {
        match self {
            ActionIntent::ReadFile { path } | ActionIntent::WriteFile { path, .. } => {
                Some(path.as_str())
            }
            _ => None,
        }
    }

    /// Human-facing one-line description for approval prompts.
    pub fn describe(&self) -> String {
        match self {
            ActionIntent::ExecShell { cmd, .. } => format!("run shell command `{cmd}`"),
            ActionIntent::Install { tool, .. } => format!("install tool `{tool}`"),
            ActionIntent::ReadFile { path } => format!("read file `{path}`"),
            ActionIntent::WriteFile { path, .. } => format!("write file `{path}`"),
            ActionIntent::RequestTool { tool, .. } => format!("request tool `{tool}`"),
            ActionIntent::MultiAgent { preset, task } => {
                format!("multi-agent session `{preset}`: {task}")
            }
            ActionIntent::Schedule { task, time } => format!("schedule `{task}` at {time}"),
            ActionIntent::Skill { name, .. } => format!("invoke skill `{name}`"),
            ActionIntent::Unrecognized { kind, .. } => format!("unrecognized action `{kind}`"),
        }
    }
}

/// Policy tier governing how an intent may execute.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    /// Execute immediately, no confirmation.
    Auto,
    /// Confirm with the user before executing.
    Ask,
    /// Confirm with the strongest warning.
    Strict,
    /// Refuse outright; never queued for approval.
    Blocked,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskTier::Auto => "AUTO",
            RiskTier::Ask => "ASK",
            RiskTier::Strict => "STRICT",
            RiskTier::Blocked => "BLOCKED",
        };
        write!(f, "{label}")
    }
}

/// Outcome of classifying one intent. Computed per assessment, never stored.
#[derive(Clone, Debug)]
pub struct RiskAssessment {
    pub tier: RiskTier,
    pub reason: String,
    /// Absolute path inside the sandbox, filled in when the intent carries
    /// a `path` field that resolved successfully.
    pub resolved_path: Option<PathBuf>,
}

impl RiskAssessment {
    pub fn new(tier: RiskTier, reason: impl Into<String>) -> Self {
        Self {
            tier,
            reason: reason.into(),
            resolved_path: None,
        }
    }

    pub fn with_resolved_path(mut self, path: PathBuf) -> Self {
        self.resolved_path = Some(path);
        self
    }
}
