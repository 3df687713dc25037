//! Cursor session parser (JSON or JSONL under a `cursor` or workspace
//! storage directory).

use std::path::Path;

use serde_json::Value;

use super::{
    content_to_text, extract_generic_messages, path_contains, project_name, session_summary,
    ParsedFile, ParserMetadata, SessionMessage, SessionParser,
};

pub struct CursorParser;

impl SessionParser for CursorParser {
    fn kind(&self) -> &'static str {
        "cursor"
    }

    fn can_parse(&self, path: &Path) -> bool {
        let ext_ok = path
            .extension()
            .is_some_and(|ext| ext == "json" || ext == "jsonl");
        ext_ok
            && (path_contains(path, "cursor")
                || path_contains(path, "Cursor")
                || path_contains(path, "workspaceStorage"))
    }

    fn parse(&self, raw: &str, path: &Path) -> Option<ParsedFile> {
        let messages = if path.extension().is_some_and(|ext| ext == "jsonl") {
            parse_jsonl(raw)
        } else {
            let root: Value = serde_json::from_str(raw).ok()?;
            extract_generic_messages(&root)
        };
        if messages.is_empty() {
            return None;
        }

        let project = project_name(None, path);
        let summary = session_summary("Cursor", &project, None, &messages);

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

fn parse_jsonl(raw: &str) -> Vec<SessionMessage> {
    raw.lines()
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .filter_map(|entry| {
            let role = entry
                .get("role")
                .or_else(|| entry.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("user")
                .to_string();
            let text = entry.get("content").and_then(|c| content_to_text(c))?;
            if text.is_empty() {
                return None;
            }
            Some(SessionMessage { role, text })
        })
        .collect()
}
