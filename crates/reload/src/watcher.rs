//! Debounced file watching.
//!
//! Raw filesystem events are classified into typed events — config,
//! bootstrap, skill — and debounced per path: any matching event restarts
//! that path's timer, and a single typed event fires when the timer
//! expires. Removed or renamed files are re-probed after the delay and
//! re-watched if they reappeared (editors that write via rename would
//! otherwise silently detach the watch).

use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default debounce delay.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Delay before re-probing a removed/renamed path.
const REPROBE_DELAY: Duration = Duration::from_millis(100);

/// The bootstrap filenames recognized in the workspace root.
const BOOTSTRAP_FILES: &[&str] = &[
    "IDENTITY.md",
    "SOUL.md",
    "AGENTS.md",
    "USER.md",
    "TOOLS.md",
    "HEARTBEAT.md",
];

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to create filesystem watcher: {0}")]
    Create(notify::Error),

    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        source: notify::Error,
    },
}

/// The type of a classified file change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    Config,
    Skill,
    Bootstrap,
}

impl fmt::Display for WatchEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchEventType::Config => write!(f, "config"),
            WatchEventType::Skill => write!(f, "skill"),
            WatchEventType::Bootstrap => write!(f, "bootstrap"),
        }
    }
}

/// A debounced, classified file change event.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub event_type: WatchEventType,
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
}

/// What to watch.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub config_path: PathBuf,
    pub workspace_path: PathBuf,
    pub watch_skills: bool,
    pub watch_bootstrap: bool,
}

/// Lexically normalize a path: drop `.` components, resolve `..`.
fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}

/// Classify a raw event path. Paths matching none of the rules are ignored.
pub fn determine_event_type(config: &WatcherConfig, path: &Path) -> Option<WatchEventType> {
    let cleaned = clean_path(path);

    if cleaned == clean_path(&config.config_path) {
        return Some(WatchEventType::Config);
    }

    let basename = cleaned.file_name()?.to_str()?;

    if config.watch_bootstrap && BOOTSTRAP_FILES.contains(&basename) {
        if let Some(parent) = cleaned.parent() {
            if parent == clean_path(&config.workspace_path) {
                return Some(WatchEventType::Bootstrap);
            }
        }
    }

    if config.watch_skills && basename == "SKILL.md" {
        let grandparent = cleaned.parent().and_then(|p| p.parent())?;
        if grandparent.file_name().and_then(|n| n.to_str()) == Some("skills") {
            return Some(WatchEventType::Skill);
        }
    }

    None
}

struct WatcherShared {
    watcher: Mutex<RecommendedWatcher>,
    config: WatcherConfig,
    debounce: Duration,
    timers: Mutex<HashMap<PathBuf, JoinHandle<()>>>,
    events_tx: mpsc::UnboundedSender<WatchEvent>,
    cancel: CancellationToken,
}

/// Watches config, bootstrap, and skills paths, emitting debounced typed
/// events on a single-reader stream.
pub struct FileWatcher {
    shared: Arc<WatcherShared>,
    events_rx: Option<mpsc::UnboundedReceiver<WatchEvent>>,
    dispatcher: Option<JoinHandle<()>>,
    raw_rx: Option<mpsc::UnboundedReceiver<Event>>,
}

impl FileWatcher {
    pub fn new(config: WatcherConfig, debounce: Duration) -> Result<Self, WatchError> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        // The notify callback runs on its own thread; forward into tokio.
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = raw_tx.send(event);
            }
            Err(e) => {
                warn!(error = %e, "Watcher error");
            }
        })
        .map_err(WatchError::Create)?;

        Ok(Self {
            shared: Arc::new(WatcherShared {
                watcher: Mutex::new(watcher),
                config,
                debounce,
                timers: Mutex::new(HashMap::new()),
                events_tx,
                cancel: CancellationToken::new(),
            }),
            events_rx: Some(events_rx),
            dispatcher: None,
            raw_rx: Some(raw_rx),
        })
    }

    /// Register the OS watches and start the dispatcher task.
    pub fn start(&mut self) -> Result<(), WatchError> {
        let config = &self.shared.config;
        info!(
            config_path = %config.config_path.display(),
            workspace_path = %config.workspace_path.display(),
            watch_skills = config.watch_skills,
            watch_bootstrap = config.watch_bootstrap,
            debounce_ms = self.shared.debounce.as_millis() as u64,
            "Starting file watcher"
        );

        {
            let mut watcher = self.shared.watcher.lock().unwrap();

            if config.config_path.exists() {
                watcher
                    .watch(&config.config_path, RecursiveMode::NonRecursive)
                    .map_err(|source| WatchError::Watch {
                        path: config.config_path.clone(),
                        source,
                    })?;
            } else {
                warn!(path = %config.config_path.display(), "Config file does not exist, skipping watch");
            }

            // One watch on the workspace root covers every bootstrap file,
            // including ones created after startup; classification filters.
            if config.watch_bootstrap && config.workspace_path.is_dir() {
                if let Err(e) = watcher.watch(&config.workspace_path, RecursiveMode::NonRecursive) {
                    warn!(error = %e, "Failed to watch workspace for bootstrap files");
                }
            }

            if config.watch_skills {
                let skills_dir = config.workspace_path.join("skills");
                if skills_dir.is_dir() {
                    if let Err(e) = watcher.watch(&skills_dir, RecursiveMode::Recursive) {
                        warn!(error = %e, "Failed to watch workspace skills");
                    }
                } else {
                    debug!(path = %skills_dir.display(), "Skills directory absent, not watching");
                }
            }
        }

        let shared = Arc::clone(&self.shared);
        let mut raw_rx = self.raw_rx.take().expect("watcher already started");
        self.dispatcher = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shared.cancel.cancelled() => return,
                    event = raw_rx.recv() => {
                        let Some(event) = event else { return };
                        Self::handle_fs_event(&shared, event);
                    }
                }
            }
        }));

        Ok(())
    }

    fn handle_fs_event(shared: &Arc<WatcherShared>, event: Event) {
        let relevant = matches!(
            &event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        );
        if !relevant {
            return;
        }

        let removed = matches!(
            &event.kind,
            EventKind::Remove(_) | EventKind::Modify(notify::event::ModifyKind::Name(_))
        );

        for path in event.paths {
            let Some(event_type) = determine_event_type(&shared.config, &path) else {
                continue;
            };
            debug!(kind = ?event.kind, path = %path.display(), "File event");
            Self::debounce(shared, event_type, path, removed);
        }
    }

    /// Restart the pending-emit timer for this path.
    fn debounce(shared: &Arc<WatcherShared>, event_type: WatchEventType, path: PathBuf, removed: bool) {
        let mut timers = shared.timers.lock().unwrap();

        if let Some(previous) = timers.remove(&path) {
            previous.abort();
        }

        let task_shared = Arc::clone(shared);
        let task_path = path.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(task_shared.debounce).await;
            task_shared.timers.lock().unwrap().remove(&task_path);

            if removed {
                // Editors often replace files by rename; re-attach the watch
                tokio::time::sleep(REPROBE_DELAY).await;
                if task_path.exists() {
                    let result = task_shared
                        .watcher
                        .lock()
                        .unwrap()
                        .watch(&task_path, RecursiveMode::NonRecursive);
                    if result.is_ok() {
                        debug!(path = %task_path.display(), "Re-watched file after recreate");
                    }
                }
            }

            let event = WatchEvent {
                event_type,
                path: task_path.clone(),
                timestamp: Utc::now(),
            };
            if task_shared.events_tx.send(event).is_ok() {
                info!(%event_type, path = %task_path.display(), "Emitted watch event");
            }
        });

        timers.insert(path, handle);
    }

    /// Take the event stream. Single reader; returns `None` if taken already.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<WatchEvent>> {
        self.events_rx.take()
    }

    /// Stop watching: drain timers, stop the dispatcher, release OS watches.
    pub async fn close(mut self) {
        info!("Closing file watcher");
        self.shared.cancel.cancel();

        let timers: Vec<JoinHandle<()>> = {
            let mut map = self.shared.timers.lock().unwrap();
            map.drain().map(|(_, handle)| handle).collect()
        };
        for timer in timers {
            timer.abort();
        }

        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.await;
        }
        // RecommendedWatcher releases its OS resources on drop
    }
}
