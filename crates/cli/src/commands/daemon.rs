//! `picoclaw daemon` — run the agent with hot reload.
//!
//! Wires the file watcher, reload manager, and SIGHUP handler around the
//! agent loop, and drains the message bus: inbound messages (published by
//! channel adapters) become agent turns, outbound messages go to the log.

use crate::runtime;
use picoclaw_agent::SessionKind;
use picoclaw_config::{config_path, load_config};
use picoclaw_reload::{
    spawn_sighup_handler, FileWatcher, ReloadManager, WatcherConfig, DEFAULT_DEBOUNCE,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_file = config_path();
    let config = load_config(&config_file)?;
    let workspace = config.workspace_path();
    let rt = runtime::build(config, config_file.clone())?;
    rt.agent.reload_skills_summary();

    let mut watcher = FileWatcher::new(
        WatcherConfig {
            config_path: config_file.clone(),
            workspace_path: workspace,
            watch_skills: true,
            watch_bootstrap: true,
        },
        DEFAULT_DEBOUNCE,
    )?;
    let mut events = watcher.events().expect("watcher events");
    watcher.start()?;

    let manager = Arc::new(ReloadManager::new(
        Arc::clone(&rt.agent),
        Arc::clone(&rt.config),
        config_file.clone(),
    ));

    let cancel = CancellationToken::new();
    let (sighup_tx, mut sighup_rx) = mpsc::unbounded_channel();
    let sighup = spawn_sighup_handler(config_file, sighup_tx, cancel.clone());

    let mut inbound = rt.bus.take_inbound().await.expect("inbound receiver");
    let mut outbound = rt.bus.take_outbound().await.expect("outbound receiver");
    let outbound_logger = tokio::spawn(async move {
        while let Some(out) = outbound.recv().await {
            info!(channel = %out.channel, chat_id = %out.chat_id, "→ {}", out.content);
        }
    });

    info!("Daemon ready (SIGHUP reloads config, Ctrl-C exits)");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            Some(event) = events.recv() => {
                let result = manager.handle_event(&event);
                info!(component = result.component, success = result.success, "{}", result.message);
            }
            Some(event) = sighup_rx.recv() => {
                let result = manager.handle_event(&event);
                info!(component = result.component, success = result.success, "{}", result.message);
            }
            Some(message) = inbound.recv() => {
                let agent = Arc::clone(&rt.agent);
                let turn_cancel = cancel.child_token();
                tokio::spawn(async move {
                    if let Err(e) = agent
                        .process_message(&message, SessionKind::Main, turn_cancel)
                        .await
                    {
                        error!(error = %e, "Turn failed");
                    }
                });
            }
        }
    }

    cancel.cancel();
    watcher.close().await;
    let _ = sighup.await;
    outbound_logger.abort();
    Ok(())
}
