//! Session-format parsers behind an open-ended trait-object registry.
//!
//! Parsers are tried in registration order; the first whose `can_parse`
//! accepts the path wins, and a `None` from its `parse` ends the attempt
//! (no fallthrough to later parsers).

pub mod claude_code;
pub mod codex;
pub mod cursor;
pub mod definitions;
pub mod opencode;

use std::path::Path;

use serde_json::Value;

/// One extracted conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMessage {
    pub role: String,
    pub text: String,
}

/// What a parser knows about the file beyond its text.
#[derive(Debug, Clone, Default)]
pub struct ParserMetadata {
    /// Format or definition kind: `claude-code`, `opencode`, `cursor`,
    /// `codex`, `skill`, `agent`, `command`.
    pub kind: String,
    /// Definition name, when the format has one.
    pub name: Option<String>,
    /// Owning project root for project-scoped definitions.
    pub project_path: Option<String>,
    /// True for plugin-scoped definitions visible everywhere.
    pub global: bool,
}

/// Parser output: a human-readable summary plus the raw messages for an
/// optional LLM summarization pass.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub summary: String,
    pub messages: Vec<SessionMessage>,
    pub metadata: ParserMetadata,
}

/// A typed parser for one session/definition format. Unknown fields in the
/// underlying JSON are tolerated throughout.
pub trait SessionParser: Send + Sync {
    fn kind(&self) -> &'static str;
    fn can_parse(&self, path: &Path) -> bool;
    fn parse(&self, raw: &str, path: &Path) -> Option<ParsedFile>;
}

/// The built-in parser set, in priority order.
pub fn default_parsers() -> Vec<Box<dyn SessionParser>> {
    vec![
        Box::new(claude_code::ClaudeCodeParser),
        Box::new(opencode::OpenCodeParser),
        Box::new(cursor::CursorParser),
        Box::new(codex::CodexParser),
        Box::new(definitions::DefinitionParser),
    ]
}

/// Truncate to at most `max` characters, appending an ellipsis when cut.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}

/// Extract readable text from a message `content` value: a plain string, or
/// an array of content blocks with `text` fields.
pub(crate) fn content_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(blocks) => {
            let parts: Vec<&str> = blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        }
        _ => None,
    }
}

/// Fallback extraction for formats that expose a generic `messages` or
/// `conversation` array of `{role, content|text}` objects.
pub(crate) fn extract_generic_messages(root: &Value) -> Vec<SessionMessage> {
    let items = root
        .get("messages")
        .or_else(|| root.get("conversation"))
        .and_then(Value::as_array);

    let Some(items) = items else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let role = item
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or("user")
                .to_string();
            let text = item
                .get("content")
                .and_then(content_to_text)
                .or_else(|| item.get("text").and_then(Value::as_str).map(String::from))?;
            if text.is_empty() {
                return None;
            }
            Some(SessionMessage { role, text })
        })
        .collect()
}

/// Shared summary shape for conversation formats.
pub(crate) fn session_summary(
    kind_label: &str,
    project: &str,
    branch: Option<&str>,
    messages: &[SessionMessage],
) -> String {
    let mut summary = format!("{kind_label} session: {project}\nMessages: {}", messages.len());
    if let Some(branch) = branch {
        summary.push_str(&format!("\nBranch: {branch}"));
    }
    if let Some(first_user) = messages.iter().find(|m| m.role == "user") {
        summary.push_str(&format!(
            "\nFirst request: {}",
            truncate_chars(&first_user.text, 200)
        ));
    }
    if let Some(last_assistant) = messages.iter().rev().find(|m| m.role == "assistant") {
        summary.push_str(&format!(
            "\nLast response: {}",
            truncate_chars(&last_assistant.text, 100)
        ));
    }
    summary
}

/// Case-sensitive substring check over the full path.
pub(crate) fn path_contains(path: &Path, needle: &str) -> bool {
    path.to_string_lossy().contains(needle)
}

/// Project name: last component of `cwd` when available, else the file's
/// parent directory name.
pub(crate) fn project_name(cwd: Option<&str>, path: &Path) -> String {
    if let Some(cwd) = cwd {
        if let Some(name) = Path::new(cwd).file_name() {
            return name.to_string_lossy().into_owned();
        }
    }
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}
