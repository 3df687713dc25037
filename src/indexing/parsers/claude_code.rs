//! Claude Code session parser (`*.jsonl` under `.claude/projects` or a
//! `claude-code` directory).
//!
//! Each line is a JSON object with a `type` in `{user, assistant, summary,
//! progress, file-history-snapshot}`; only user/assistant lines with
//! `message.content` contribute messages.

use std::path::Path;

use serde_json::Value;

use super::{
    content_to_text, path_contains, project_name, session_summary, ParsedFile, ParserMetadata,
    SessionMessage, SessionParser,
};

pub struct ClaudeCodeParser;

impl SessionParser for ClaudeCodeParser {
    fn kind(&self) -> &'static str {
        "claude-code"
    }

    fn can_parse(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "jsonl")
            && (path_contains(path, ".claude/projects") || path_contains(path, "claude-code"))
    }

    fn parse(&self, raw: &str, path: &Path) -> Option<ParsedFile> {
        let mut messages = Vec::new();
        let mut cwd: Option<String> = None;
        let mut branch: Option<String> = None;

        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            // Tolerate corrupt lines; sessions are append-only and tails
            // can be mid-write.
            let Ok(entry) = serde_json::from_str::<Value>(line) else {
                continue;
            };

            if cwd.is_none() {
                cwd = entry.get("cwd").and_then(Value::as_str).map(String::from);
            }
            if branch.is_none() {
                branch = entry
                    .get("gitBranch")
                    .and_then(Value::as_str)
                    .filter(|b| !b.is_empty())
                    .map(String::from);
            }

            let role = match entry.get("type").and_then(Value::as_str) {
                Some(role @ ("user" | "assistant")) => role,
                _ => continue,
            };
            let Some(text) = entry
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(content_to_text)
            else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            messages.push(SessionMessage {
                role: role.to_string(),
                text,
            });
        }

        if messages.is_empty() {
            return None;
        }

        let project = project_name(cwd.as_deref(), path);
        let summary = session_summary("Claude Code", &project, branch.as_deref(), &messages);

        Some(ParsedFile {
            summary,
            messages,
            metadata: ParserMetadata {
                kind: self.kind().to_string(),
                ..Default::default()
            },
        })
    }
}
