//! Codex session parser (`*.json` under `.codex`).

use std::path::Path;

use serde_json::Value;

use super::{
    extract_generic_messages, path_contains, project_name, session_summary, ParsedFile,
    ParserMetadata, SessionParser,
};

pub struct CodexParser;

impl SessionParser for CodexParser {
    fn kind(&self) -> &'static str {
        "codex"
    }

    fn can_parse(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "json") && path_contains(path, ".codex")
    }

    fn parse(&self, raw: &str, path: &Path) -> Option<ParsedFile> {
        let root: Value = serde_json::from_str(raw).ok()?;
        let messages = extract_generic_messages(&root);
        if messages.is_empty() {
            return None;
        }

        let project = project_name(root.get("cwd").and_then(Value::as_str), path);
        let summary = session_summary("Codex", &project, None, &messages);

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
