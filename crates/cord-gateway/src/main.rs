//! Gateway runner
//!
//! Connects a bot to the gateway and logs every dispatch event.
//!
//! ```bash
//! DISCORD_TOKEN=... cargo run -p cord-gateway
//! ```

use cord_common::{try_init_tracing, BotConfig};
use cord_gateway::Gateway;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = try_init_tracing() {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run().await {
        error!(error = %e, "Gateway failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = BotConfig::from_env()?;

    info!("Connecting to the gateway...");
    let gateway = Gateway::new(config.token).await?;
    gateway.open().await?;

    let mut events = match gateway.take_events() {
        Some(events) => events,
        None => return Err("event channel already taken".into()),
    };

    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(event = %event, "dispatch");
        }
    });

    tokio::select! {
        err = gateway.wait() => {
            event_task.abort();
            return Err(err.into());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    gateway.close().await?;
    event_task.abort();

    Ok(())
}
