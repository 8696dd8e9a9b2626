//! Hot reload plumbing.
//!
//! Watches the config file, bootstrap files, and workspace skills for
//! changes, debounces the raw filesystem noise into typed events, and
//! routes each event to the matching selective live update on the running
//! agent. A SIGHUP synthesizes a config event.

pub mod manager;
pub mod signals;
pub mod watcher;

pub use manager::{ReloadManager, ReloadResult};
pub use signals::spawn_sighup_handler;
pub use watcher::{
    FileWatcher, WatchError, WatchEvent, WatchEventType, WatcherConfig, DEFAULT_DEBOUNCE,
};
