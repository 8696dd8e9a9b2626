//! `picoclaw agent` — chat from the terminal.

use crate::runtime;
use picoclaw_agent::SessionKind;
use picoclaw_config::{config_path, load_config};
use picoclaw_core::InboundMessage;
use tokio_util::sync::CancellationToken;
use tracing::error;

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config_file = config_path();
    let config = load_config(&config_file)?;
    let rt = runtime::build(config, config_file)?;

    // Print outbound messages as they arrive (the message tool can emit
    // mid-turn, before the final answer)
    let mut outbound = rt.bus.take_outbound().await.expect("outbound receiver");
    let printer = tokio::spawn(async move {
        while let Some(out) = outbound.recv().await {
            println!("{}", out.content);
        }
    });

    rt.agent.reload_skills_summary();

    if let Some(content) = message {
        let inbound = InboundMessage::new("cli", "main", content);
        if let Err(e) = rt
            .agent
            .process_message(&inbound, SessionKind::Main, CancellationToken::new())
            .await
        {
            error!(error = %e, "Turn failed");
        }
    } else {
        println!("PicoClaw interactive mode. Ctrl-D to exit.");
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            if stdin.read_line(&mut line)? == 0 {
                break;
            }
            let content = line.trim();
            if content.is_empty() {
                continue;
            }

            let inbound = InboundMessage::new("cli", "main", content);
            if let Err(e) = rt
                .agent
                .process_message(&inbound, SessionKind::Main, CancellationToken::new())
                .await
            {
                error!(error = %e, "Turn failed");
            }
            // Let the printer flush before the next prompt
            tokio::task::yield_now().await;
        }
    }

    drop(rt);
    printer.abort();
    Ok(())
}
