//! # pager-cli
//!
//! Command-line client for a Pager server.
//!
//! ```bash
//! # Publish one message
//! pager-cli send "Hello"
//!
//! # Print every delivered message, reconnecting as needed
//! pager-cli watch
//!
//! # Poll the latest message instead of streaming
//! pager-cli watch --poll 10
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pager_client::{ClientConfig, Direction, MessagingClient, SendStatus};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pager-cli", version, about = "Send and watch Pager messages")]
struct Cli {
    /// Server base URL.
    #[arg(long, env = "PAGER_URL", default_value = "http://127.0.0.1:8080")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish one message and report its status.
    Send {
        /// Message text.
        text: String,
    },
    /// Print every delivered message.
    Watch {
        /// Poll the read endpoint every N seconds instead of streaming.
        #[arg(long, value_name = "SECS")]
        poll: Option<u64>,

        /// Seconds to wait before reconnecting a dropped stream.
        #[arg(long, default_value_t = 5)]
        reconnect_delay: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pager_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig {
        base_url: cli.url.trim_end_matches('/').to_string(),
        ..ClientConfig::default()
    };

    match cli.command {
        Command::Send { text } => {
            let client = MessagingClient::http(config).context("Failed to build client")?;
            let message = client.send(&text).await?;
            println!("{} {}", message.status, message.text);
            if message.status == SendStatus::Failed {
                anyhow::bail!("Message was not delivered");
            }
        }
        Command::Watch {
            poll,
            reconnect_delay,
        } => {
            config.reconnect_delay = Duration::from_secs(reconnect_delay);
            let client = MessagingClient::http(config).context("Failed to build client")?;
            watch(client, poll.map(Duration::from_secs)).await?;
        }
    }

    Ok(())
}

async fn watch(client: MessagingClient, poll: Option<Duration>) -> Result<()> {
    let mut updates = client.updates();
    let mut state = client.watch_device_state();

    let poller = match poll {
        Some(interval) => {
            let c = client.clone();
            Some(tokio::spawn(async move { c.poll(interval).await }))
        }
        None => {
            client.connect();
            None
        }
    };

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(message) if message.direction == Direction::Inbound => {
                    println!("{}", message.text);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => eprintln!("(missed {n} updates)"),
                Err(RecvError::Closed) => break,
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = state.borrow_and_update().status;
                eprintln!("[{status}]");
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.shutdown();
    if let Some(poller) = poller {
        poller.await.context("Poller panicked")?;
    }
    Ok(())
}
