//! Bootstrap file loading with budget enforcement.
//!
//! Bootstrap files are the fixed set of workspace Markdown documents that
//! seed the system prompt. Each session kind selects a subset; two budgets
//! apply — a per-file cap and an aggregate cap — and oversized files are
//! shrunk by a head/tail rule so both the opening instructions and the
//! trailing notes survive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::debug;

/// Default maximum size for a single bootstrap file.
pub const DEFAULT_BOOTSTRAP_MAX_CHARS: usize = 20_000;

/// Default total size across all bootstrap files.
pub const DEFAULT_BOOTSTRAP_TOTAL_MAX_CHARS: usize = 24_000;

/// Fraction of content preserved from the beginning.
pub const BOOTSTRAP_HEAD_RATIO: f64 = 0.70;

/// Fraction of content preserved from the end.
pub const BOOTSTRAP_TAIL_RATIO: f64 = 0.20;

/// Minimum leftover budget worth spending on another file.
const MIN_USEFUL_BUDGET: usize = 500;

/// The kind of session, controlling bootstrap filtering and whether
/// per-user memory is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// A regular user session (full bootstrap)
    Main,
    /// A scheduled task session (minimal bootstrap, no memory)
    Cron,
    /// A subagent session (minimal bootstrap)
    Subagent,
    /// A heartbeat session (HEARTBEAT.md only)
    Heartbeat,
}

/// Bootstrap truncation budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Per-file maximum
    pub max_chars: usize,
    /// Total across all files
    pub total_max_chars: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_BOOTSTRAP_MAX_CHARS,
            total_max_chars: DEFAULT_BOOTSTRAP_TOTAL_MAX_CHARS,
        }
    }
}

/// The bootstrap files a session kind loads, in order.
pub fn bootstrap_files_for_session(kind: SessionKind) -> &'static [&'static str] {
    match kind {
        SessionKind::Main => &[
            "AGENTS.md",
            "SOUL.md",
            "TOOLS.md",
            "IDENTITY.md",
            "USER.md",
            "HEARTBEAT.md",
        ],
        // No personal memory for cron/subagent sessions; isolation
        SessionKind::Cron | SessionKind::Subagent => &["AGENTS.md", "TOOLS.md"],
        SessionKind::Heartbeat => &["HEARTBEAT.md"],
    }
}

/// Largest index ≤ `idx` that falls on a char boundary.
fn floor_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Smallest index ≥ `idx` that falls on a char boundary.
fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Shrink a bootstrap file to `max_chars`, keeping the head and tail and
/// joining them with a marker that names the file and the dropped size.
pub fn trim_bootstrap_content(content: &str, filename: &str, max_chars: usize) -> String {
    trim_with_charge(content, filename, max_chars).0
}

/// Like [`trim_bootstrap_content`], but also reports the kept byte count.
/// Budgets charge for kept content only; the marker itself is free.
fn trim_with_charge(content: &str, filename: &str, max_chars: usize) -> (String, usize) {
    if content.len() <= max_chars {
        return (content.to_string(), content.len());
    }

    let mut head_size = (max_chars as f64 * BOOTSTRAP_HEAD_RATIO) as usize;
    let tail_size = (max_chars as f64 * BOOTSTRAP_TAIL_RATIO) as usize;

    // Head and tail must not overlap
    if head_size + tail_size > content.len() {
        head_size = content.len().saturating_sub(tail_size + 100);
    }

    let head = &content[..floor_boundary(content, head_size)];
    let tail = if tail_size > 0 && content.len() > head.len() {
        let tail_start = content.len().saturating_sub(tail_size).max(head.len());
        &content[ceil_boundary(content, tail_start)..]
    } else {
        ""
    };

    let dropped = content.len() - head.len() - tail.len();
    debug!(
        filename,
        original_bytes = content.len(),
        kept_bytes = head.len() + tail.len(),
        max_limit = max_chars,
        "Bootstrap file truncated"
    );

    let charged = head.len() + tail.len();
    if tail.is_empty() {
        return (format!("{head}\n[...truncated {filename}...]"), charged);
    }

    let rendered = format!(
        "{head}\n\n[...truncated {filename}: kept {}+{} of {} bytes ({dropped} dropped), read {filename} for full content...]\n\n{tail}",
        head.len(),
        tail.len(),
        content.len(),
    );
    (rendered, charged)
}

/// Load the bootstrap files for a session kind, enforcing both budgets.
/// Files absent on disk are silently skipped.
pub fn load_bootstrap_files(
    workspace: &Path,
    config: BootstrapConfig,
    kind: SessionKind,
) -> String {
    let mut result = String::new();
    let mut total_used = 0usize;

    for filename in bootstrap_files_for_session(kind) {
        let path = workspace.join(filename);
        let Ok(data) = std::fs::read_to_string(&path) else {
            debug!(filename, path = %path.display(), "Bootstrap file not found, skipping");
            continue;
        };

        let (mut content, mut charged) = if data.len() > config.max_chars {
            trim_with_charge(&data, filename, config.max_chars)
        } else {
            let len = data.len();
            (data, len)
        };

        // Would this file blow the total budget?
        if total_used + charged > config.total_max_chars {
            let remaining = config.total_max_chars.saturating_sub(total_used);
            if remaining >= MIN_USEFUL_BUDGET {
                (content, charged) = trim_with_charge(&content, filename, remaining);
            } else {
                debug!(
                    filename,
                    total_used,
                    total_limit = config.total_max_chars,
                    "Bootstrap file skipped, total budget exhausted"
                );
                continue;
            }
        }

        total_used += charged;
        result.push_str(&format!("## {filename}\n\n{content}\n\n"));
    }

    result
}

/// Cache of rendered bootstrap sections, keyed by session kind and the
/// mtimes of the source files. A config change also misses.
pub struct BootstrapCache {
    inner: Mutex<HashMap<SessionKind, CacheEntry>>,
}

struct CacheEntry {
    stamps: Vec<(PathBuf, Option<SystemTime>)>,
    config: BootstrapConfig,
    rendered: String,
}

impl BootstrapCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Load via the cache: a hit requires matching mtimes and budgets.
    pub fn load(&self, workspace: &Path, config: BootstrapConfig, kind: SessionKind) -> String {
        let stamps = Self::stamps(workspace, kind);

        {
            let cache = self.inner.lock().unwrap();
            if let Some(entry) = cache.get(&kind) {
                if entry.stamps == stamps && entry.config == config {
                    return entry.rendered.clone();
                }
            }
        }

        let rendered = load_bootstrap_files(workspace, config, kind);
        let mut cache = self.inner.lock().unwrap();
        cache.insert(
            kind,
            CacheEntry {
                stamps,
                config,
                rendered: rendered.clone(),
            },
        );
        rendered
    }

    /// Purge all cached sections.
    pub fn invalidate(&self) {
        self.inner.lock().unwrap().clear();
    }

    fn stamps(workspace: &Path, kind: SessionKind) -> Vec<(PathBuf, Option<SystemTime>)> {
        bootstrap_files_for_session(kind)
            .iter()
            .map(|filename| {
                let path = workspace.join(filename);
                let mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
                (path, mtime)
            })
            .collect()
    }
}

impl Default for BootstrapCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn small_content_untouched() {
        let content = "short enough";
        assert_eq!(trim_bootstrap_content(content, "AGENTS.md", 100), content);
    }

    #[test]
    fn trim_keeps_head_and_tail() {
        let content = "a".repeat(280).to_string() + &"z".repeat(120);
        let trimmed = trim_bootstrap_content(&content, "AGENTS.md", 100);

        assert!(trimmed.starts_with(&"a".repeat(70)));
        assert!(trimmed.ends_with(&"z".repeat(20)));
        assert!(trimmed.contains("[...truncated AGENTS.md"));
        assert!(trimmed.contains("310 dropped"));
    }

    #[test]
    fn trim_respects_utf8_boundaries() {
        let content = "语".repeat(200);
        let trimmed = trim_bootstrap_content(&content, "SOUL.md", 100);
        // Must not split a multi-byte char; the result is valid by
        // construction, but verify the kept sizes are near the caps
        assert!(trimmed.contains("[...truncated"));
    }

    #[test]
    fn session_kinds_select_subsets() {
        assert_eq!(bootstrap_files_for_session(SessionKind::Main).len(), 6);
        assert_eq!(
            bootstrap_files_for_session(SessionKind::Cron),
            &["AGENTS.md", "TOOLS.md"]
        );
        assert_eq!(
            bootstrap_files_for_session(SessionKind::Subagent),
            &["AGENTS.md", "TOOLS.md"]
        );
        assert_eq!(
            bootstrap_files_for_session(SessionKind::Heartbeat),
            &["HEARTBEAT.md"]
        );
    }

    #[test]
    fn per_file_budget_enforced() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("AGENTS.md"), "x".repeat(400)).unwrap();

        let config = BootstrapConfig {
            max_chars: 100,
            total_max_chars: 150,
        };
        let loaded = load_bootstrap_files(dir.path(), config, SessionKind::Main);

        // 70 head + marker + 20 tail; the included content respects the cap
        assert!(loaded.contains(&"x".repeat(70)));
        assert!(loaded.contains("[...truncated AGENTS.md"));
    }

    #[test]
    fn total_budget_skips_when_remaining_too_small() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("AGENTS.md"), "a".repeat(900)).unwrap();
        std::fs::write(dir.path().join("SOUL.md"), "b".repeat(900)).unwrap();

        let config = BootstrapConfig {
            max_chars: 1000,
            total_max_chars: 1000,
        };
        let loaded = load_bootstrap_files(dir.path(), config, SessionKind::Main);

        assert!(loaded.contains("## AGENTS.md"));
        // Only 100 bytes of budget left — below the useful minimum
        assert!(!loaded.contains("## SOUL.md"));
    }

    #[test]
    fn remaining_budget_reapplied_as_cap() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("AGENTS.md"), "a".repeat(900)).unwrap();
        std::fs::write(dir.path().join("SOUL.md"), "b".repeat(2000)).unwrap();

        let config = BootstrapConfig {
            max_chars: 1000,
            total_max_chars: 1600,
        };
        let loaded = load_bootstrap_files(dir.path(), config, SessionKind::Main);

        assert!(loaded.contains("## AGENTS.md"));
        // SOUL.md squeezed into the ~700 bytes remaining
        assert!(loaded.contains("## SOUL.md"));
        assert!(loaded.contains("[...truncated SOUL.md"));
    }

    #[test]
    fn missing_files_silently_skipped() {
        let dir = TempDir::new().unwrap();
        let loaded = load_bootstrap_files(dir.path(), BootstrapConfig::default(), SessionKind::Main);
        assert!(loaded.is_empty());
    }

    #[test]
    fn cache_hits_until_file_changes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("AGENTS.md"), "version one").unwrap();

        let cache = BootstrapCache::new();
        let config = BootstrapConfig::default();
        let first = cache.load(dir.path(), config, SessionKind::Main);
        assert!(first.contains("version one"));

        // Unchanged mtimes: same rendered content
        let second = cache.load(dir.path(), config, SessionKind::Main);
        assert_eq!(first, second);

        // Invalidation forces a re-read
        std::fs::write(dir.path().join("AGENTS.md"), "version two").unwrap();
        cache.invalidate();
        let third = cache.load(dir.path(), config, SessionKind::Main);
        assert!(third.contains("version two"));
    }
}
