//! OpenCode session parser (`*.json` under `.opencode/history`).

use std::path::Path;

use serde_json::Value;

use super::{
    extract_generic_messages, path_contains, project_name, session_summary, ParsedFile,
    ParserMetadata, SessionParser,
};

pub struct OpenCodeParser;

impl SessionParser for OpenCodeParser {
    fn kind(&self) -> &'static str {
        "opencode"
    }

    fn can_parse(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "json")
            && path_contains(path, ".opencode/history")
    }

    fn parse(&self, raw: &str, path: &Path) -> Option<ParsedFile> {
        let root: Value = serde_json::from_str(raw).ok()?;
        let messages = extract_generic_messages(&root);
        if messages.is_empty() {
            return None;
        }

        let cwd = root
            .get("cwd")
            .or_else(|| root.get("workingDirectory"))
            .and_then(Value::as_str);
        let project = project_name(cwd, path);
        let summary = session_summary("OpenCode", &project, None, &messages);

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
