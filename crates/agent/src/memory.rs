//! Persistent file-based memory.
//!
//! Layout under the workspace:
//! - Long-term memory: `memory/MEMORY.md`
//! - Daily notes: `memory/YYYYMM/YYYYMMDD.md`
//! - Per-user variants: `memory/users/<id>/...`
//!
//! An optional additional memory directory contributes a second
//! `MEMORY.md` to the formatted context.

use chrono::{Duration, Local};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub struct MemoryStore {
    memory_dir: PathBuf,
    memory_file: PathBuf,
    additional_dir: RwLock<Option<PathBuf>>,
}

impl MemoryStore {
    /// Create a store rooted at the workspace, ensuring `memory/` exists.
    pub fn new(workspace: &Path) -> Self {
        let memory_dir = workspace.join("memory");
        let memory_file = memory_dir.join("MEMORY.md");
        let _ = std::fs::create_dir_all(&memory_dir);

        Self {
            memory_dir,
            memory_file,
            additional_dir: RwLock::new(None),
        }
    }

    /// Point at an extra directory whose MEMORY.md joins the context.
    pub fn set_additional_dir(&self, dir: Option<PathBuf>) {
        *self.additional_dir.write().unwrap() = dir;
    }

    fn user_memory_dir(&self, user_id: &str) -> PathBuf {
        if user_id.is_empty() {
            self.memory_dir.clone()
        } else {
            self.memory_dir.join("users").join(user_id)
        }
    }

    fn user_memory_file(&self, user_id: &str) -> PathBuf {
        if user_id.is_empty() {
            self.memory_file.clone()
        } else {
            self.user_memory_dir(user_id).join("MEMORY.md")
        }
    }

    /// Path to today's daily note for a user (shared when `user_id` is empty).
    fn user_today_file(&self, user_id: &str) -> PathBuf {
        let today = Local::now().format("%Y%m%d").to_string();
        let month = &today[..6];
        self.user_memory_dir(user_id).join(month).join(format!("{today}.md"))
    }

    /// The display path for a user's long-term memory, for the identity
    /// header. Relative to the workspace root.
    pub fn memory_display_path(user_id: &str) -> String {
        if user_id.is_empty() {
            "memory/MEMORY.md".to_string()
        } else {
            format!("memory/users/{user_id}/MEMORY.md")
        }
    }

    /// Read long-term memory. Missing file reads as empty.
    pub fn read_long_term(&self, user_id: &str) -> String {
        std::fs::read_to_string(self.user_memory_file(user_id)).unwrap_or_default()
    }

    /// Overwrite long-term memory, creating the user directory if needed.
    pub fn write_long_term(&self, user_id: &str, content: &str) -> std::io::Result<()> {
        let file = self.user_memory_file(user_id);
        if let Some(dir) = file.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(file, content)
    }

    /// Read today's daily note. Missing file reads as empty.
    pub fn read_today(&self, user_id: &str) -> String {
        std::fs::read_to_string(self.user_today_file(user_id)).unwrap_or_default()
    }

    /// Append to today's daily note, adding a date header for a new day.
    pub fn append_today(&self, user_id: &str, content: &str) -> std::io::Result<()> {
        let file = self.user_today_file(user_id);
        if let Some(dir) = file.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let existing = std::fs::read_to_string(&file).unwrap_or_default();
        let new_content = if existing.is_empty() {
            let header = Local::now().format("# %Y-%m-%d\n\n").to_string();
            format!("{header}{content}")
        } else {
            format!("{existing}\n{content}")
        };

        std::fs::write(file, new_content)
    }

    /// Daily notes from the last `days` days, newest first, joined with
    /// `---` separators.
    pub fn recent_daily_notes(&self, user_id: &str, days: i64) -> String {
        let base = self.user_memory_dir(user_id);
        let mut parts = Vec::new();

        for i in 0..days {
            let date = Local::now() - Duration::days(i);
            let date_str = date.format("%Y%m%d").to_string();
            let month = &date_str[..6];
            let path = base.join(month).join(format!("{date_str}.md"));
            if let Ok(data) = std::fs::read_to_string(path) {
                parts.push(data);
            }
        }

        parts.join("\n\n---\n\n")
    }

    /// Formatted memory context for the prompt: long-term memory plus
    /// recent daily notes, plus the additional directory if configured.
    pub fn memory_context(&self, user_id: &str) -> String {
        let long_term = self.read_long_term(user_id);
        let recent = self.recent_daily_notes(user_id, 3);
        let additional = self.read_additional();

        if long_term.is_empty() && recent.is_empty() && additional.is_empty() {
            return String::new();
        }

        let mut sections = Vec::new();
        if !long_term.is_empty() {
            sections.push(format!("## Long-term Memory\n\n{long_term}"));
        }
        if !recent.is_empty() {
            sections.push(format!("## Recent Daily Notes\n\n{recent}"));
        }
        if !additional.is_empty() {
            sections.push(format!("## Additional Memory\n\n{additional}"));
        }

        format!("# Memory\n\n{}", sections.join("\n\n---\n\n"))
    }

    fn read_additional(&self) -> String {
        let guard = self.additional_dir.read().unwrap();
        let Some(dir) = guard.as_ref() else {
            return String::new();
        };
        std::fs::read_to_string(dir.join("MEMORY.md")).unwrap_or_default()
    }
}
