//! A relay node for poking at by hand.
//!
//! ```text
//! relay-node                 # stream relay on 0.0.0.0:9999
//! relay-node config.json     # any RelayConfig, e.g.
//!                            # {"transport":{"mode":"group","group":"230.0.0.0","port":4446,"interface":"0.0.0.0"}}
//! ```
//!
//! Runs until Ctrl-C. Every event from the relay is logged.

use std::error::Error;

use relaychat::{ChatEvent, RelayConfig, Supervisor};

fn load_config() -> Result<RelayConfig, Box<dyn Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => Ok(RelayConfig::default()),
    }
}

fn log_event(event: ChatEvent) {
    match event {
        ChatEvent::Message(msg) => match msg.body_text() {
            Some(text) => tracing::info!(from = msg.sender(), to = msg.target(), %text, "message"),
            None => tracing::info!(
                from = msg.sender(),
                to = msg.target(),
                file = msg.filename().unwrap_or_default(),
                bytes = msg.payload().map_or(0, <[u8]>::len),
                "file"
            ),
        },
        ChatEvent::RosterChanged(names) => tracing::info!(?names, "roster"),
        ChatEvent::Status { state, detail } => {
            tracing::info!(%state, detail = detail.as_deref().unwrap_or(""), "status")
        }
        ChatEvent::TargetNotFound { sender, target } => {
            tracing::warn!(%sender, %target, "target not found")
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    relaychat::init_tracing();

    let config = load_config()?;
    let (relay, mut events) = Supervisor::builder().build();
    relay.start(config).await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => log_event(event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("ctrl-c received, stopping");
                break;
            }
        }
    }

    relay.stop().await;
    while let Ok(event) = events.try_recv() {
        log_event(event);
    }
    Ok(())
}
