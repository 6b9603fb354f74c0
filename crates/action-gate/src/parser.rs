//! Structured directive extraction from finished reply text.
//!
//! The assistant embeds its action plan as JSON, usually fenced, sometimes
//! bare, always surrounded by prose. Extraction is tolerant: a malformed
//! plan is reported, never raised, and the reply degrades to plain text.

use golem_core_types::ActionIntent;
use serde_json::Value;
use tracing::debug;

/// Result of scanning one reply for directives.
#[derive(Debug, Default)]
pub struct Extraction {
    pub intents: Vec<ActionIntent>,
    /// Set when structured content was present but unusable. The caller
    /// reports this and treats the reply as plain text.
    pub parse_error: Option<String>,
}

impl Extraction {
    fn plain() -> Self {
        Self::default()
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self {
            intents: Vec::new(),
            parse_error: Some(reason.into()),
        }
    }
}

/// Extract zero or more action intents from `reply`.
pub fn extract_intents(reply: &str) -> Extraction {
    // Fenced block first; the protocol asks for one.
    if let Some(block) = fenced_json_block(reply) {
        return match serde_json::from_str::<Value>(&block) {
            Ok(value) => from_value(value),
            Err(err) => Extraction::failed(format!("fenced block is not valid JSON: {err}")),
        };
    }

    // Fallback: a bare array-of-objects somewhere in the text.
    if let Some(value) = bare_json_array(reply) {
        return from_value(value);
    }

    Extraction::plain()
}

fn from_value(value: Value) -> Extraction {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        other => {
            return Extraction::failed(format!(
                "action plan must be an object or array, got {}",
                type_name(&other)
            ))
        }
    };

    let mut intents = Vec::new();
    for item in items {
        match item {
            Value::Object(_) => intents.push(intent_from_object(item)),
            // A plan mixing objects with scalars is malformed as a whole.
            other => {
                return Extraction::failed(format!(
                    "action plan entries must be objects, got {}",
                    type_name(&other)
                ))
            }
        }
    }
    debug!(count = intents.len(), "extracted action intents");
    Extraction {
        intents,
        parse_error: None,
    }
}

fn intent_from_object(value: Value) -> ActionIntent {
    let kind = value
        .get("action")
        .or_else(|| value.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_ascii_lowercase();

    let text_field = |names: &[&str]| -> Option<String> {
        names
            .iter()
            .find_map(|name| value.get(*name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let reason = text_field(&["reason"]);

    match kind.as_str() {
        "exec_shell" | "command" | "shell" => match text_field(&["cmd", "parameter", "command"]) {
            Some(cmd) => ActionIntent::ExecShell { cmd, reason },
            None => unrecognized(kind, value),
        },
        "install" => match text_field(&["tool", "package", "parameter"]) {
            Some(tool) => ActionIntent::Install { tool, reason },
            None => unrecognized(kind, value),
        },
        "read_file" => match text_field(&["path", "file"]) {
            Some(path) => ActionIntent::ReadFile { path },
            None => unrecognized(kind, value),
        },
        "write_file" => {
            match (text_field(&["path", "file"]), text_field(&["content"])) {
                (Some(path), Some(content)) => ActionIntent::WriteFile { path, content },
                _ => unrecognized(kind, value),
            }
        }
        "request_tool" => match text_field(&["tool", "parameter"]) {
            Some(tool) => ActionIntent::RequestTool { tool, reason },
            None => unrecognized(kind, value),
        },
        "multi_agent" => {
            match (text_field(&["preset"]), text_field(&["task"])) {
                (Some(preset), Some(task)) => ActionIntent::MultiAgent { preset, task },
                _ => unrecognized(kind, value),
            }
        }
        "schedule" => {
            match (text_field(&["task"]), text_field(&["time"])) {
                (Some(task), Some(time)) => ActionIntent::Schedule { task, time },
                _ => unrecognized(kind, value),
            }
        }
        // Dynamic skills announce themselves with an args payload. Anything
        // else is explicitly unrecognized so the classifier can apply the
        // strictest tier.
        other if !other.is_empty() => {
            if let Some(args) = value.get("args") {
                ActionIntent::Skill {
                    name: other.to_string(),
                    args: args.clone(),
                }
            } else {
                unrecognized(kind, value)
            }
        }
        _ => unrecognized(kind, value),
    }
}

fn unrecognized(kind: String, raw: Value) -> ActionIntent {
    ActionIntent::Unrecognized { kind, raw }
}

/// First fenced code block whose content parses as JSON-ish. Accepts a
/// `json` language tag or none at all.
fn fenced_json_block(text: &str) -> Option<String> {
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let tag = after[..body_start].trim();
        let body = &after[body_start..];
        let end = body.find("```")?;
        let content = body[..end].trim();
        if (tag.is_empty() || tag.eq_ignore_ascii_case("json"))
            && (content.starts_with('[') || content.starts_with('{'))
        {
            return Some(content.to_string());
        }
        rest = &body[end + 3..];
    }
    None
}

/// Best-effort scan for a top-level `[...]` span holding a non-empty
/// array of objects. Bracketed prose earlier in the text ("[see notes]")
/// does not parse as a plan, so the scan moves on to each later `[`.
fn bare_json_array(text: &str) -> Option<Value> {
    let mut from = 0;
    while let Some(found) = text[from..].find('[') {
        let start = from + found;
        if let Some(len) = bracket_span(&text[start..]) {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..start + len]) {
                if value
                    .as_array()
                    .is_some_and(|items| !items.is_empty() && items.iter().all(Value::is_object))
                {
                    return Some(value);
                }
            }
        }
        from = start + 1;
    }
    None
}

/// Length of the balanced `[...]` span at the start of `text`, respecting
/// strings. `None` when the bracket never closes.
fn bracket_span(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in text.as_bytes().iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_with_surrounding_prose() {
        let reply = "Sure, here is the plan:\n```json\n[{\"action\": \"exec_shell\", \"cmd\": \"ls\", \"reason\": \"list files\"}]\n```\nDone.";
        let extraction = extract_intents(reply);
        assert!(extraction.parse_error.is_none());
        assert_eq!(
            extraction.intents,
            vec![ActionIntent::ExecShell {
                cmd: "ls".into(),
                reason: Some("list files".into()),
            }]
        );
    }

    #[test]
    fn single_object_is_wrapped() {
        let reply = "```json\n{\"action\": \"read_file\", \"path\": \"notes/todo.txt\"}\n```";
        let extraction = extract_intents(reply);
        assert_eq!(
            extraction.intents,
            vec![ActionIntent::ReadFile {
                path: "notes/todo.txt".into()
            }]
        );
    }

    #[test]
    fn unfenced_array_is_detected() {
        let reply = "I'll do that now. [{\"action\": \"command\", \"parameter\": \"uptime\"}] as requested.";
        let extraction = extract_intents(reply);
        assert_eq!(
            extraction.intents,
            vec![ActionIntent::ExecShell {
                cmd: "uptime".into(),
                reason: None,
            }]
        );
    }

    #[test]
    fn bracketed_prose_before_the_array_is_skipped() {
        let reply =
            "[see notes] Running it now. [{\"action\": \"command\", \"parameter\": \"df -h\"}]";
        let extraction = extract_intents(reply);
        assert_eq!(
            extraction.intents,
            vec![ActionIntent::ExecShell {
                cmd: "df -h".into(),
                reason: None,
            }]
        );
    }

    #[test]
    fn plain_prose_yields_nothing() {
        let extraction = extract_intents("Just a friendly answer with no plan.");
        assert!(extraction.intents.is_empty());
        assert!(extraction.parse_error.is_none());
    }

    #[test]
    fn malformed_fenced_json_is_reported_not_raised() {
        let reply = "```json\n[{\"action\": \"exec_shell\", \"cmd\": }]\n```";
        let extraction = extract_intents(reply);
        assert!(extraction.intents.is_empty());
        assert!(extraction.parse_error.is_some());
    }

    #[test]
    fn unknown_kind_maps_to_unrecognized() {
        let reply = "```json\n[{\"action\": \"launch_rocket\", \"target\": \"moon\"}]\n```";
        let extraction = extract_intents(reply);
        assert!(matches!(
            &extraction.intents[0],
            ActionIntent::Unrecognized { kind, .. } if kind == "launch_rocket"
        ));
    }

    #[test]
    fn skill_with_args_payload() {
        let reply = "```json\n[{\"action\": \"spotify\", \"args\": {\"track\": \"x\"}}]\n```";
        let extraction = extract_intents(reply);
        assert!(matches!(
            &extraction.intents[0],
            ActionIntent::Skill { name, .. } if name == "spotify"
        ));
    }

    #[test]
    fn missing_required_field_is_unrecognized() {
        let reply = "```json\n[{\"action\": \"exec_shell\", \"reason\": \"no cmd\"}]\n```";
        let extraction = extract_intents(reply);
        assert!(matches!(
            &extraction.intents[0],
            ActionIntent::Unrecognized { kind, .. } if kind == "exec_shell"
        ));
    }

    #[test]
    fn brackets_inside_strings_do_not_confuse_the_scan() {
        let reply = "Note [see docs]. ```json\n[{\"action\": \"exec_shell\", \"cmd\": \"echo ']'\"}]\n```";
        let extraction = extract_intents(reply);
        assert_eq!(extraction.intents.len(), 1);
    }
}
