//! Session persistence.
//!
//! A session is the durable history of one (channel, chat) conversation,
//! plus its running summary. Sessions live in memory and are written to
//! `sessions/<session-id>.json` under the workspace after each turn.

use picoclaw_core::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub id: String,

    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// In-memory session map with JSON persistence.
pub struct SessionStore {
    dir: PathBuf,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    /// `workspace` is the agent workspace root; sessions live in its
    /// `sessions/` subdirectory.
    pub fn new(workspace: &std::path::Path) -> Self {
        Self {
            dir: workspace.join("sessions"),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Session ids come from channel/chat identifiers; keep filenames tame.
    fn sanitize(key: &str) -> String {
        key.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::sanitize(key)))
    }

    /// Current history for a session, loading from disk on first access.
    pub fn history(&self, key: &str) -> Vec<Message> {
        self.load_into_cache(key);
        let sessions = self.sessions.lock().unwrap();
        sessions.get(key).map(|s| s.messages.clone()).unwrap_or_default()
    }

    /// The running summary for a session, if any.
    pub fn summary(&self, key: &str) -> Option<String> {
        self.load_into_cache(key);
        let sessions = self.sessions.lock().unwrap();
        sessions.get(key).and_then(|s| s.summary.clone())
    }

    /// Append messages to a session's history.
    pub fn append(&self, key: &str, messages: Vec<Message>) {
        self.load_into_cache(key);
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.entry(key.to_string()).or_insert_with(|| Session {
            id: key.to_string(),
            ..Session::default()
        });
        session.messages.extend(messages);
    }

    /// Replace a session's history and summary (after summarization).
    pub fn replace(&self, key: &str, messages: Vec<Message>, summary: Option<String>) {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.entry(key.to_string()).or_insert_with(|| Session {
            id: key.to_string(),
            ..Session::default()
        });
        session.messages = messages;
        session.summary = summary;
    }

    /// Persist a session to disk. Failures are logged, not fatal: the
    /// in-memory session stays authoritative for the process lifetime.
    pub fn save(&self, key: &str) {
        let snapshot = {
            let sessions = self.sessions.lock().unwrap();
            let Some(session) = sessions.get(key) else {
                return;
            };
            session.clone()
        };

        if let Err(e) = self.write_session(&snapshot, key) {
            warn!(session = key, error = %e, "Failed to persist session");
        }
    }

    fn write_session(&self, session: &Session, key: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let data = serde_json::to_string_pretty(session)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(self.path_for(key), data)
    }

    fn load_into_cache(&self, key: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(key) {
            return;
        }
        let Ok(data) = std::fs::read_to_string(self.path_for(key)) else {
            return;
        };
        match serde_json::from_str::<Session>(&data) {
            Ok(session) => {
                sessions.insert(key.to_string(), session);
            }
            Err(e) => {
                warn!(session = key, error = %e, "Ignoring unreadable session file");
            }
        }
    }
}
