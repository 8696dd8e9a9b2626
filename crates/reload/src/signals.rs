//! SIGHUP → config reload.
//!
//! The traditional daemon convention: a hang-up signal re-reads the
//! configuration. The handler synthesizes a config watch event so the
//! reload path is identical to an on-disk change.

use crate::watcher::{WatchEvent, WatchEventType};
use chrono::Utc;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spawn the SIGHUP listener. Each signal sends a synthesized config event
/// for `config_path` on `events_tx`. The task exits on cancellation.
#[cfg(unix)]
pub fn spawn_sighup_handler(
    config_path: PathBuf,
    events_tx: mpsc::UnboundedSender<WatchEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut hangup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Failed to register SIGHUP handler");
                return;
            }
        };

        info!("Signal handler registered for SIGHUP");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Stopping signal handler");
                    return;
                }
                received = hangup.recv() => {
                    if received.is_none() {
                        return;
                    }
                    info!("SIGHUP received, triggering config reload");
                    let event = WatchEvent {
                        event_type: WatchEventType::Config,
                        path: config_path.clone(),
                        timestamp: Utc::now(),
                    };
                    if events_tx.send(event).is_err() {
                        return;
                    }
                }
            }
        }
    })
}

/// Non-Unix builds have no SIGHUP; the handler is a no-op task.
#[cfg(not(unix))]
pub fn spawn_sighup_handler(
    _config_path: PathBuf,
    _events_tx: mpsc::UnboundedSender<WatchEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move { cancel.cancelled().await })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Send SIGHUP to this process via /bin/kill.
    fn send_self_sighup() {
        let status = std::process::Command::new("kill")
            .args(["-HUP", &std::process::id().to_string()])
            .status()
            .expect("kill available on unix");
        assert!(status.success());
    }

    #[tokio::test]
    async fn sighup_synthesizes_config_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = spawn_sighup_handler(PathBuf::from("/state/config.json"), tx, cancel.clone());

        // Give the handler a beat to register before signalling ourselves
        tokio::time::sleep(Duration::from_millis(50)).await;
        send_self_sighup();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("expected a synthesized event")
            .expect("stream open");
        assert_eq!(event.event_type, WatchEventType::Config);
        assert_eq!(event.path, PathBuf::from("/state/config.json"));

        cancel.cancel();
        let _ = handle.await;
    }
}
