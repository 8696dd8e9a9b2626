//! Markdown frontmatter parsing with YAML support.
//!
//! Skill files and other workspace documents carry a leading metadata block
//! delimited by `---` lines. Parsing goes YAML-first with a line-based
//! fallback, so hand-written `key: value` blocks that are not valid YAML
//! still load. All values are coerced to strings.

use regex_lite::Regex;
use std::collections::HashMap;
use std::path::MAIN_SEPARATOR;
use std::sync::OnceLock;

/// Parsed frontmatter key-value pairs. Values are stored as strings after
/// type coercion.
pub type ParsedFrontmatter = HashMap<String, String>;

fn key_value_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([\w-]+):\s*(.*)$").unwrap())
}

/// Extract and parse frontmatter from markdown content.
///
/// Supports both YAML and line-based formats:
///
/// ```text
/// ---
/// key: value
/// key2: "quoted value"
/// key3: |
///   multi-line
///   value
/// ---
/// ```
pub fn parse_frontmatter_block(content: &str) -> ParsedFrontmatter {
    let content = normalize_line_endings(content);

    let Some(block) = frontmatter_block(&content) else {
        return ParsedFrontmatter::new();
    };

    let yaml_parsed = parse_yaml_frontmatter(block);
    let line_parsed = parse_line_based_frontmatter(block);

    // If YAML parsing failed, use line-based
    let Some(mut result) = yaml_parsed else {
        return line_parsed;
    };

    // Merge: YAML as base, line-based overrides for bracketed values
    // (the line parser keeps the literal `[a, b]` spelling)
    for (key, value) in line_parsed {
        if value.starts_with('[') || value.starts_with('{') {
            result.insert(key, value);
        }
    }

    result
}

/// Remove the frontmatter block from content. Content without a block is
/// returned unchanged.
pub fn strip_frontmatter(content: &str) -> &str {
    if !content.starts_with("---") {
        return content;
    }

    let Some(end_index) = content.find("\n---") else {
        return content;
    };

    // Start after the closing "---", then drop leading whitespace
    let after = &content[end_index + "\n---".len()..];
    after.trim_start_matches([' ', '\t', '\n', '\r'])
}

/// Convert absolute paths to use `~` for the home directory. Saves tokens
/// in prompts.
pub fn compact_path(path: &str, home_dir: &str) -> String {
    if home_dir.is_empty() {
        return path.to_string();
    }

    let home = home_dir.trim_end_matches(['/', '\\']);
    let prefix = format!("{home}{MAIN_SEPARATOR}");

    match path.strip_prefix(&prefix) {
        Some(rest) => format!("~{MAIN_SEPARATOR}{rest}"),
        None => path.to_string(),
    }
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// The text between the opening `---` line and the closing `\n---`.
fn frontmatter_block(content: &str) -> Option<&str> {
    if !content.starts_with("---") || content.len() < 4 || !content.is_char_boundary(4) {
        return None;
    }
    let tail = &content[4..];
    let end = tail.find("\n---")?;
    Some(&tail[..end])
}

fn parse_yaml_frontmatter(block: &str) -> Option<ParsedFrontmatter> {
    let data: serde_yaml::Value = serde_yaml::from_str(block).ok()?;
    let mapping = data.as_mapping()?;

    let mut result = ParsedFrontmatter::new();
    for (key, value) in mapping {
        let Some(key) = key.as_str() else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let coerced = coerce_value(value);
        if !coerced.is_empty() {
            result.insert(key.to_string(), coerced);
        }
    }

    Some(result)
}

/// Convert any YAML value to its string representation.
fn coerce_value(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::String(s) => s.trim().to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Sequence(items) => {
            let parts: Vec<String> = items.iter().map(coerce_value).collect();
            format!("[{}]", parts.join(", "))
        }
        serde_yaml::Value::Mapping(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| {
                    let key = k.as_str().map(str::to_string).unwrap_or_else(|| coerce_value(k));
                    format!("{}: {}", key, coerce_value(v))
                })
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        serde_yaml::Value::Tagged(tagged) => coerce_value(&tagged.value),
    }
}

/// Line-by-line fallback for non-YAML frontmatter. Handles indented
/// continuation lines and quote stripping.
fn parse_line_based_frontmatter(block: &str) -> ParsedFrontmatter {
    let mut frontmatter = ParsedFrontmatter::new();
    let lines: Vec<&str> = block.split('\n').collect();

    let mut i = 0;
    while i < lines.len() {
        let Some(captures) = key_value_pattern().captures(lines[i]) else {
            i += 1;
            continue;
        };

        let key = captures.get(1).map_or("", |m| m.as_str()).trim();
        if key.is_empty() {
            i += 1;
            continue;
        }

        let inline_value = captures.get(2).map_or("", |m| m.as_str()).trim();

        // Empty inline value followed by an indented line: multi-line value
        if inline_value.is_empty() && i + 1 < lines.len() {
            let next = lines[i + 1];
            if next.starts_with(' ') || next.starts_with('\t') {
                let (value, consumed) = extract_multi_line_value(&lines, i);
                if !value.is_empty() {
                    frontmatter.insert(key.to_string(), value);
                }
                i += consumed;
                continue;
            }
        }

        let value = strip_quotes(inline_value);
        if !value.is_empty() {
            frontmatter.insert(key.to_string(), value.to_string());
        }
        i += 1;
    }

    frontmatter
}

/// Collect indented continuation lines after `lines[start]` into one value.
/// Returns the value and the number of lines consumed.
fn extract_multi_line_value(lines: &[&str], start: usize) -> (String, usize) {
    let mut value_lines = Vec::new();
    let mut i = start + 1;
    while i < lines.len() {
        let line = lines[i];
        if !line.is_empty() && !line.starts_with(' ') && !line.starts_with('\t') {
            break;
        }
        value_lines.push(line);
        i += 1;
    }

    let combined = value_lines.join("\n");
    (combined.trim().to_string(), i - start)
}

/// Remove surrounding single or double quotes from a string.
fn strip_quotes(value: &str) -> &str {
    if value.len() >= 2 {
        let stripped = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
        if let Some(stripped) = stripped {
            return stripped;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_yaml_frontmatter_block() {
        let content = "---\n\
name: test-skill\n\
description: \"A test skill with YAML frontmatter\"\n\
always: true\n\
os: [linux, darwin]\n\
---\n\n# Skill Content";

        let frontmatter = parse_frontmatter_block(content);

        assert_eq!(frontmatter["name"], "test-skill");
        assert_eq!(frontmatter["description"], "A test skill with YAML frontmatter");
        assert_eq!(frontmatter["always"], "true");
        assert_eq!(frontmatter["os"], "[linux, darwin]");
    }

    #[test]
    fn parse_line_based_block() {
        let content = "---\nname: simple-skill\ndescription: Simple line-based frontmatter\n---\n\n# Content";
        let frontmatter = parse_frontmatter_block(content);
        assert_eq!(frontmatter["name"], "simple-skill");
        assert_eq!(frontmatter["description"], "Simple line-based frontmatter");
    }

    #[test]
    fn parse_multi_line_value() {
        let content = "---\n\
name: multiline-skill\n\
description: |\n\
  This is a multi-line\n\
  description that spans\n\
  multiple lines.\n\
---\n\n# Content";

        let frontmatter = parse_frontmatter_block(content);
        assert_eq!(frontmatter["name"], "multiline-skill");
        assert_eq!(
            frontmatter["description"],
            "This is a multi-line\ndescription that spans\nmultiple lines."
        );
    }

    #[test]
    fn no_frontmatter_is_empty() {
        let content = "# Just regular markdown content\nNo frontmatter here.";
        assert!(parse_frontmatter_block(content).is_empty());
    }

    #[test]
    fn unterminated_block_is_empty() {
        let content = "---\nname: test\nno closing delimiter";
        assert!(parse_frontmatter_block(content).is_empty());
    }

    #[test]
    fn quote_stripping() {
        let content = "---\nname: \"quoted-name\"\ndescription: 'single-quoted'\n---\n\n# Content";
        let frontmatter = parse_frontmatter_block(content);
        assert_eq!(frontmatter["name"], "quoted-name");
        assert_eq!(frontmatter["description"], "single-quoted");
    }

    #[test]
    fn crlf_line_endings() {
        let content = "---\r\nname: windows-skill\r\ndescription: CRLF\r\n---\r\n\r\nbody";
        let frontmatter = parse_frontmatter_block(content);
        assert_eq!(frontmatter["name"], "windows-skill");
    }

    #[test]
    fn strip_removes_block() {
        let content = "---\nname: test\ndescription: A test\n---\n\n# Actual Content\nSome content here.";
        let stripped = strip_frontmatter(content);
        assert!(stripped.starts_with("# Actual Content"));
    }

    #[test]
    fn strip_without_frontmatter_is_identity() {
        let content = "# No frontmatter\nJust content.";
        assert_eq!(strip_frontmatter(content), content);
    }

    #[test]
    fn strip_empty_block() {
        let content = "---\n---\nbody";
        assert_eq!(strip_frontmatter(content), "body");
    }

    #[test]
    fn reemitted_frontmatter_reparses_identically() {
        let content = "---\nname: stable-skill\ndescription: Round trip\npriority: 5\n---\nbody";
        let first = parse_frontmatter_block(content);

        let mut keys: Vec<&String> = first.keys().collect();
        keys.sort();
        let reemitted = format!(
            "---\n{}\n---\nbody",
            keys.iter()
                .map(|k| format!("{k}: {}", first[*k]))
                .collect::<Vec<_>>()
                .join("\n")
        );

        let second = parse_frontmatter_block(&reemitted);
        assert_eq!(first, second);
    }

    #[test]
    fn compact_path_under_home() {
        assert_eq!(
            compact_path("/home/user/.picoclaw/workspace/skills/test/SKILL.md", "/home/user"),
            "~/.picoclaw/workspace/skills/test/SKILL.md"
        );
    }

    #[test]
    fn compact_path_outside_home() {
        assert_eq!(compact_path("/tmp/test.md", "/home/user"), "/tmp/test.md");
    }

    #[test]
    fn compact_path_empty_home() {
        assert_eq!(compact_path("/home/user/test.md", ""), "/home/user/test.md");
    }

    #[test]
    fn compact_path_roundtrip() {
        let home = "/home/user";
        let path = "/home/user/docs/notes.md";
        let compacted = compact_path(path, home);
        let expanded = compacted.replacen('~', home, 1);
        assert_eq!(expanded, path);

        // Paths outside home do not round-trip through ~
        let outside = "/var/log/syslog";
        assert_eq!(compact_path(outside, home), outside);
    }
}
