//! Skill discovery and layering.
//!
//! Skills are named knowledge packs: a directory holding a `SKILL.md` whose
//! frontmatter describes the skill. Three roots are scanned in priority
//! order — workspace, global, builtin — and the first occurrence of a name
//! wins. The catalog renders as a compact XML summary for the system
//! prompt; full bodies load on demand.

use chrono::{DateTime, Utc};
use picoclaw_markdown::{compact_path, parse_frontmatter_block, strip_frontmatter};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const MAX_NAME_LENGTH: usize = 64;
pub const MAX_DESCRIPTION_LENGTH: usize = 1024;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9]+(-[a-zA-Z0-9]+)*$").unwrap())
}

/// Which root a skill was discovered in. Workspace wins over global wins
/// over builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillSource {
    Workspace,
    Global,
    Builtin,
}

impl fmt::Display for SkillSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkillSource::Workspace => write!(f, "workspace"),
            SkillSource::Global => write!(f, "global"),
            SkillSource::Builtin => write!(f, "builtin"),
        }
    }
}

/// Parsed frontmatter from a skill's `SKILL.md` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMetadata {
    // Core fields (required)
    pub name: String,
    pub description: String,

    // Display fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    // Invocation control
    #[serde(default)]
    pub always: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_key: Option<String>,
    /// User can invoke (default: true)
    #[serde(default = "default_true")]
    pub user_invocable: bool,
    /// Model cannot auto-invoke (default: false)
    #[serde(default)]
    pub disable_model_invocation: bool,

    // Environment requirements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_env: Option<String>,
    /// Platform restrictions (linux, macos, windows)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub os: Vec<String>,

    // Agent type support
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_types: Vec<String>,
    /// Loading priority (higher = earlier, default: 0)
    #[serde(default)]
    pub priority: i32,

    /// Installation specs, populated by structured installers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install: Vec<SkillInstallSpec>,

    /// When metadata was loaded
    #[serde(skip)]
    pub loaded_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// How to install a skill's dependencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillInstallSpec {
    /// brew, node, go, uv, download
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A discovered skill with its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillInfo {
    pub name: String,
    pub path: PathBuf,
    pub source: SkillSource,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SkillMetadata>,
    /// Path with `~` for the home directory
    pub compact_path: String,
}

impl SkillInfo {
    fn validate(&self) -> Result<(), String> {
        let mut errs = Vec::new();

        if self.name.is_empty() {
            errs.push("name is required".to_string());
        } else {
            if self.name.len() > MAX_NAME_LENGTH {
                errs.push(format!("name exceeds {MAX_NAME_LENGTH} characters"));
            }
            if !name_pattern().is_match(&self.name) {
                errs.push("name must be alphanumeric with hyphens".to_string());
            }
        }

        if self.description.is_empty() {
            errs.push("description is required".to_string());
        } else if self.description.len() > MAX_DESCRIPTION_LENGTH {
            errs.push(format!("description exceeds {MAX_DESCRIPTION_LENGTH} characters"));
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs.join("; "))
        }
    }
}

/// Discovers and layers skills from the three source roots.
pub struct SkillsLoader {
    workspace_skills: PathBuf,
    global_skills: PathBuf,
    builtin_skills: PathBuf,
}

impl SkillsLoader {
    /// `workspace` is the agent workspace root; its `skills/` subdirectory
    /// is the highest-priority source.
    pub fn new(
        workspace: impl AsRef<Path>,
        global_skills: impl Into<PathBuf>,
        builtin_skills: impl Into<PathBuf>,
    ) -> Self {
        Self {
            workspace_skills: workspace.as_ref().join("skills"),
            global_skills: global_skills.into(),
            builtin_skills: builtin_skills.into(),
        }
    }

    /// Enumerate all admitted skills, highest-priority source first.
    /// Invalid skills are logged and skipped, never fatal.
    pub fn list_skills(&self) -> Vec<SkillInfo> {
        let home_dir = home_dir_for_compaction();
        let mut skills: Vec<SkillInfo> = Vec::new();

        let roots = [
            (&self.workspace_skills, SkillSource::Workspace),
            (&self.global_skills, SkillSource::Global),
            (&self.builtin_skills, SkillSource::Builtin),
        ];

        for (root, source) in roots {
            for (dir_name, skill_file) in candidate_dirs(root) {
                let mut info = SkillInfo {
                    name: dir_name.clone(),
                    path: skill_file.clone(),
                    source,
                    description: String::new(),
                    metadata: None,
                    compact_path: compact_path(&skill_file.to_string_lossy(), &home_dir),
                };

                if let Some(metadata) = self.skill_metadata(&skill_file) {
                    info.name = metadata.name.clone();
                    info.description = metadata.description.clone();
                    info.metadata = Some(metadata);
                }

                // Higher-priority source already claimed this name
                if skills.iter().any(|s| s.name == info.name) {
                    continue;
                }

                if let Err(e) = info.validate() {
                    warn!(name = %info.name, source = %source, error = %e, "Invalid skill, skipping");
                    continue;
                }

                skills.push(info);
            }
        }

        skills
    }

    /// Load a named skill's full body (frontmatter stripped). Resolution
    /// follows the same priority as discovery.
    pub fn load_skill(&self, name: &str) -> Option<String> {
        for root in [&self.workspace_skills, &self.global_skills, &self.builtin_skills] {
            let skill_file = root.join(name).join("SKILL.md");
            if let Ok(content) = std::fs::read_to_string(&skill_file) {
                return Some(strip_frontmatter(&content).to_string());
            }
        }
        None
    }

    /// Join the bodies of the named skills for direct context injection.
    pub fn load_skills_for_context(&self, skill_names: &[String]) -> String {
        let parts: Vec<String> = skill_names
            .iter()
            .filter_map(|name| {
                self.load_skill(name)
                    .map(|content| format!("### Skill: {name}\n\n{content}"))
            })
            .collect();
        parts.join("\n\n---\n\n")
    }

    /// Generate an XML summary of available skills for the system prompt.
    /// Uses compact paths (`~` substitution) to save tokens.
    pub fn build_skills_summary(&self) -> String {
        let all_skills = self.list_skills();
        if all_skills.is_empty() {
            return String::new();
        }

        let mut lines = vec!["<skills>".to_string()];
        for skill in &all_skills {
            lines.push("  <skill>".to_string());
            lines.push(format!("    <name>{}</name>", escape_xml(&skill.name)));
            lines.push(format!(
                "    <description>{}</description>",
                escape_xml(&skill.description)
            ));
            lines.push(format!(
                "    <location>{}</location>",
                escape_xml(&skill.compact_path)
            ));
            lines.push(format!("    <source>{}</source>", skill.source));

            if let Some(metadata) = &skill.metadata {
                if !metadata.agent_types.is_empty() {
                    lines.push(format!(
                        "    <agentTypes>{}</agentTypes>",
                        escape_xml(&metadata.agent_types.join(", "))
                    ));
                }
                if metadata.priority != 0 {
                    lines.push(format!("    <priority>{}</priority>", metadata.priority));
                }
            }
            lines.push("  </skill>".to_string());
        }
        lines.push("</skills>".to_string());

        lines.join("\n")
    }

    /// Parse metadata from a skill's `SKILL.md`. Only a read failure yields
    /// `None`; empty frontmatter defaults the name to the directory basename.
    fn skill_metadata(&self, skill_path: &Path) -> Option<SkillMetadata> {
        let content = match std::fs::read_to_string(skill_path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %skill_path.display(), error = %e, "Failed to read skill metadata");
                return None;
            }
        };

        let dir_name = || {
            skill_path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        };

        let frontmatter = parse_frontmatter_block(&content);
        if frontmatter.is_empty() {
            return Some(SkillMetadata {
                name: dir_name(),
                description: String::new(),
                emoji: None,
                homepage: None,
                always: false,
                skill_key: None,
                user_invocable: true,
                disable_model_invocation: false,
                primary_env: None,
                os: Vec::new(),
                agent_types: Vec::new(),
                priority: 0,
                install: Vec::new(),
                loaded_at: Some(Utc::now()),
            });
        }

        let get = |key: &str| frontmatter.get(key).filter(|v| !v.is_empty()).cloned();

        let mut metadata = SkillMetadata {
            name: get("name").unwrap_or_default(),
            description: get("description").unwrap_or_default(),
            emoji: get("emoji"),
            homepage: get("homepage"),
            always: get("always").is_some_and(|v| is_truthy(&v)),
            skill_key: get("skillKey"),
            user_invocable: get("userInvocable").map_or(true, |v| !is_falsy(&v)),
            disable_model_invocation: get("disableModelInvocation").is_some_and(|v| is_truthy(&v)),
            primary_env: get("primaryEnv"),
            os: get("os").map(|v| parse_list(&v)).unwrap_or_default(),
            agent_types: get("agentTypes").map(|v| parse_list(&v)).unwrap_or_default(),
            priority: get("priority").and_then(|v| v.trim().parse().ok()).unwrap_or(0),
            install: Vec::new(),
            loaded_at: Some(Utc::now()),
        };

        // Fallback name from directory if not specified
        if metadata.name.is_empty() {
            metadata.name = dir_name();
        }

        debug!(name = %metadata.name, path = %skill_path.display(), "Parsed skill metadata");
        Some(metadata)
    }
}

/// Top-level subdirectories of `root` that contain a `SKILL.md`.
fn candidate_dirs(root: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };

    let mut candidates: Vec<(String, PathBuf)> = entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let skill_file = entry.path().join("SKILL.md");
            skill_file
                .is_file()
                .then(|| (entry.file_name().to_string_lossy().to_string(), skill_file))
        })
        .collect();

    // Directory iteration order is platform-dependent; sort for stable output
    candidates.sort();
    candidates
}

/// Handle both array-like `[linux, darwin]` and comma-separated spellings.
fn parse_list(value: &str) -> Vec<String> {
    value
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_truthy(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn is_falsy(value: &str) -> bool {
    value.eq_ignore_ascii_case("false") || value == "0"
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn home_dir_for_compaction() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_skill(root: &Path, name: &str, description: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {name}\ndescription: {description}\n---\n\n# {name}\n\nBody of {name}.\n"),
        )
        .unwrap();
    }

    struct Roots {
        _workspace: TempDir,
        _global: TempDir,
        _builtin: TempDir,
        loader: SkillsLoader,
        workspace_skills: PathBuf,
        global_skills: PathBuf,
        builtin_skills: PathBuf,
    }

    fn roots() -> Roots {
        let workspace = TempDir::new().unwrap();
        let global = TempDir::new().unwrap();
        let builtin = TempDir::new().unwrap();
        let workspace_skills = workspace.path().join("skills");
        let global_skills = global.path().to_path_buf();
        let builtin_skills = builtin.path().to_path_buf();
        fs::create_dir_all(&workspace_skills).unwrap();
        let loader = SkillsLoader::new(workspace.path(), &global_skills, &builtin_skills);
        Roots {
            _workspace: workspace,
            _global: global,
            _builtin: builtin,
            loader,
            workspace_skills,
            global_skills,
            builtin_skills,
        }
    }

    #[test]
    fn workspace_overrides_global_overrides_builtin() {
        let r = roots();
        write_skill(&r.workspace_skills, "alpha", "W");
        write_skill(&r.global_skills, "alpha", "G");
        write_skill(&r.global_skills, "beta", "Gb");
        write_skill(&r.builtin_skills, "beta", "Bb");
        write_skill(&r.builtin_skills, "gamma", "B");

        let skills = r.loader.list_skills();
        assert_eq!(skills.len(), 3);

        let find = |name: &str| skills.iter().find(|s| s.name == name).unwrap();
        assert_eq!(find("alpha").description, "W");
        assert_eq!(find("alpha").source, SkillSource::Workspace);
        assert_eq!(find("beta").description, "Gb");
        assert_eq!(find("beta").source, SkillSource::Global);
        assert_eq!(find("gamma").description, "B");
        assert_eq!(find("gamma").source, SkillSource::Builtin);
    }

    #[test]
    fn names_are_unique_in_catalog() {
        let r = roots();
        write_skill(&r.workspace_skills, "dup", "first");
        write_skill(&r.global_skills, "dup", "second");
        write_skill(&r.builtin_skills, "dup", "third");

        let skills = r.loader.list_skills();
        assert_eq!(skills.iter().filter(|s| s.name == "dup").count(), 1);
    }

    #[test]
    fn invalid_name_is_rejected() {
        let r = roots();
        let dir = r.workspace_skills.join("badskill");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("SKILL.md"),
            "---\nname: bad name\ndescription: has a space in the name\n---\nbody",
        )
        .unwrap();

        assert!(r.loader.list_skills().is_empty());
    }

    #[test]
    fn overlong_description_is_rejected() {
        let r = roots();
        write_skill(&r.workspace_skills, "wordy", &"x".repeat(MAX_DESCRIPTION_LENGTH + 1));
        assert!(r.loader.list_skills().is_empty());
    }

    #[test]
    fn empty_frontmatter_defaults_name_but_fails_validation() {
        let r = roots();
        let dir = r.workspace_skills.join("bare");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("SKILL.md"), "# No frontmatter at all\n").unwrap();

        // Name defaults to the directory, but description is required
        assert!(r.loader.list_skills().is_empty());
    }

    #[test]
    fn metadata_fields_parse() {
        let r = roots();
        let dir = r.workspace_skills.join("rich");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("SKILL.md"),
            "---\nname: rich\ndescription: A rich skill\nemoji: \"🔧\"\nalways: true\nuserInvocable: false\nos: [linux, darwin]\nagentTypes: chat, specialist\npriority: 7\n---\nbody",
        )
        .unwrap();

        let skills = r.loader.list_skills();
        let metadata = skills[0].metadata.as_ref().unwrap();
        assert_eq!(metadata.emoji.as_deref(), Some("🔧"));
        assert!(metadata.always);
        assert!(!metadata.user_invocable);
        assert_eq!(metadata.os, vec!["linux", "darwin"]);
        assert_eq!(metadata.agent_types, vec!["chat", "specialist"]);
        assert_eq!(metadata.priority, 7);
    }

    #[test]
    fn load_skill_strips_frontmatter() {
        let r = roots();
        write_skill(&r.global_skills, "howto", "How to do things");

        let body = r.loader.load_skill("howto").unwrap();
        assert!(!body.contains("---"));
        assert!(body.starts_with("# howto"));
    }

    #[test]
    fn load_skill_missing_returns_none() {
        let r = roots();
        assert!(r.loader.load_skill("nope").is_none());
    }

    #[test]
    fn load_skill_prefers_workspace() {
        let r = roots();
        write_skill(&r.workspace_skills, "shared", "workspace copy");
        write_skill(&r.builtin_skills, "shared", "builtin copy");

        let body = r.loader.load_skill("shared").unwrap();
        assert!(body.contains("Body of shared"));
        // Resolution hit the workspace root first
        let skills = r.loader.list_skills();
        assert_eq!(skills[0].source, SkillSource::Workspace);
    }

    #[test]
    fn summary_lists_each_skill_once() {
        let r = roots();
        write_skill(&r.workspace_skills, "alpha", "First skill");
        write_skill(&r.global_skills, "beta", "Second <&> skill");

        let summary = r.loader.build_skills_summary();
        assert!(summary.starts_with("<skills>"));
        assert!(summary.ends_with("</skills>"));
        assert_eq!(summary.matches("<skill>").count(), 2);
        assert!(summary.contains("<name>alpha</name>"));
        // XML escaping applied to descriptions
        assert!(summary.contains("Second &lt;&amp;&gt; skill"));
    }

    #[test]
    fn summary_empty_when_no_skills() {
        let r = roots();
        assert!(r.loader.build_skills_summary().is_empty());
    }

    #[test]
    fn context_block_joins_bodies() {
        let r = roots();
        write_skill(&r.workspace_skills, "one", "First");
        write_skill(&r.workspace_skills, "two", "Second");

        let block = r
            .loader
            .load_skills_for_context(&["one".to_string(), "two".to_string(), "missing".to_string()]);
        assert!(block.contains("### Skill: one"));
        assert!(block.contains("### Skill: two"));
        assert!(block.contains("\n\n---\n\n"));
        assert!(!block.contains("missing"));
    }
}
