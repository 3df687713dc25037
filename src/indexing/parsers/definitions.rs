//! Skill / agent / command definition parser: markdown with YAML-style
//! frontmatter under `.claude/{skills|agents|commands}/`, directly in a
//! project or inside a plugin pack.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use super::{path_contains, ParsedFile, ParserMetadata, SessionParser};

pub struct DefinitionParser;

const KIND_DIRS: &[(&str, &str)] = &[("skills", "skill"), ("agents", "agent"), ("commands", "command")];

impl SessionParser for DefinitionParser {
    fn kind(&self) -> &'static str {
        "definition"
    }

    fn can_parse(&self, path: &Path) -> bool {
        if !path.extension().is_some_and(|ext| ext == "md") {
            return false;
        }
        if !path_contains(path, ".claude/") {
            return false;
        }
        KIND_DIRS
            .iter()
            .any(|(dir, _)| path_contains(path, &format!("/{dir}/")))
    }

    fn parse(&self, raw: &str, path: &Path) -> Option<ParsedFile> {
        let frontmatter = parse_frontmatter(raw)?;
        // A definition without a description is not indexable.
        let description = frontmatter.get("description").and_then(Value::as_str)?;

        let kind = definition_kind(path)?;
        let name = frontmatter
            .get("name")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })?;

        let global = path_contains(path, ".claude/plugins/");
        let project_path = if global { None } else { project_root(path) };

        let kind_label = {
            let mut label = kind.to_string();
            label[..1].make_ascii_uppercase();
            label
        };
        let mut summary = format!("{kind_label}: {name}\n{description}");
        match &project_path {
            Some(project) => summary.push_str(&format!("\nScope: project ({project})")),
            None if global => summary.push_str("\nScope: global (plugin)"),
            None => {}
        }

        Some(ParsedFile {
            summary,
            messages: Vec::new(),
            metadata: ParserMetadata {
                kind: kind.to_string(),
                name: Some(name),
                project_path,
                global,
            },
        })
    }
}

/// Which definition directory the path sits under.
fn definition_kind(path: &Path) -> Option<&'static str> {
    KIND_DIRS
        .iter()
        .find(|(dir, _)| path_contains(path, &format!("/{dir}/")))
        .map(|(_, kind)| *kind)
}

/// `{X}` for paths shaped `{X}/.claude/(skills|agents|commands)/...`.
fn project_root(path: &Path) -> Option<String> {
    let text = path.to_string_lossy();
    let idx = text.find("/.claude/")?;
    if idx == 0 {
        return None;
    }
    Some(text[..idx].to_string())
}

/// Parse `key: value` frontmatter between `---` fences. The bool literals
/// `true`/`false` are recognized; everything else stays a string.
fn parse_frontmatter(raw: &str) -> Option<BTreeMap<String, Value>> {
    let mut lines = raw.lines();
    if lines.next()?.trim() != "---" {
        return None;
    }

    let mut fields = BTreeMap::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed == "---" {
            return Some(fields);
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let key = key.trim().to_string();
        let value = value.trim().trim_matches('"');
        let parsed = match value {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            other => Value::String(other.to_string()),
        };
        fields.insert(key, parsed);
    }

    // Unterminated frontmatter is malformed.
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKILL: &str = "---\nname: deploy\ndescription: Deploy the app to staging\nuser-invocable: true\n---\n# Steps\n1. build\n";

    #[test]
    fn can_parse_requires_md_under_definition_dirs() {
        let parser = DefinitionParser;
        assert!(parser.can_parse(Path::new("/p/.claude/skills/deploy/SKILL.md")));
        assert!(parser.can_parse(Path::new("/p/.claude/agents/reviewer.md")));
        assert!(parser.can_parse(Path::new("/p/.claude/commands/ship.md")));
        assert!(parser.can_parse(Path::new(
            "/u/.claude/plugins/pack/skills/x/SKILL.md"
        )));
        assert!(!parser.can_parse(Path::new("/p/.claude/skills/deploy/notes.txt")));
        assert!(!parser.can_parse(Path::new("/p/docs/skills/deploy.md")));
    }

    #[test]
    fn parses_project_scoped_skill() {
        let path = Path::new("/home/u/proj/.claude/skills/deploy/SKILL.md");
        let parsed = DefinitionParser.parse(SKILL, path).unwrap();

        assert_eq!(parsed.metadata.kind, "skill");
        assert_eq!(parsed.metadata.name.as_deref(), Some("deploy"));
        assert!(!parsed.metadata.global);
        assert_eq!(
            parsed.metadata.project_path.as_deref(),
            Some("/home/u/proj")
        );
        assert!(parsed.summary.contains("Skill: deploy"));
        assert!(parsed.summary.contains("Deploy the app to staging"));
        assert!(parsed.summary.contains("Scope: project (/home/u/proj)"));
        assert!(parsed.messages.is_empty());
    }

    #[test]
    fn plugin_definitions_are_global() {
        let path = Path::new("/home/u/.claude/plugins/pack/commands/ship.md");
        let raw = "---\ndescription: Ship it\n---\n";
        let parsed = DefinitionParser.parse(raw, path).unwrap();

        assert_eq!(parsed.metadata.kind, "command");
        assert!(parsed.metadata.global);
        assert!(parsed.metadata.project_path.is_none());
        // Name falls back to the file stem.
        assert_eq!(parsed.metadata.name.as_deref(), Some("ship"));
        assert!(parsed.summary.contains("Scope: global (plugin)"));
    }

    #[test]
    fn missing_description_declines() {
        let raw = "---\nname: incomplete\n---\nbody";
        let path = Path::new("/p/.claude/agents/incomplete.md");
        assert!(DefinitionParser.parse(raw, path).is_none());
    }

    #[test]
    fn malformed_frontmatter_declines() {
        let path = Path::new("/p/.claude/skills/x/SKILL.md");
        assert!(DefinitionParser.parse("no frontmatter here", path).is_none());
        assert!(DefinitionParser
            .parse("---\ndescription: unterminated\n", path)
            .is_none());
    }

    #[test]
    fn bool_literals_are_recognized() {
        let fields = parse_frontmatter(SKILL).unwrap();
        assert_eq!(fields.get("user-invocable"), Some(&Value::Bool(true)));
        assert_eq!(
            fields.get("description"),
            Some(&Value::String("Deploy the app to staging".into()))
        );
    }
}
