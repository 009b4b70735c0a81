//! Duenet - command line client
//!
//! Connects to a server, sends a JSON greeting on a fixed interval and logs
//! everything the server sends back.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use duenet::config::{self, Config};
use duenet::{Client, PayloadData};

/// Duenet - game server protocol client
#[derive(Parser)]
#[command(name = "duenet")]
#[command(author = "Duenet Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Talk to a route/seq framed game server", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and exchange messages until Ctrl+C
    Connect {
        /// Server address (host:port); defaults to the configured address
        #[arg(short, long)]
        addr: Option<String>,

        /// Route to send the greeting on
        #[arg(short, long, default_value_t = 1)]
        route: u32,

        /// Milliseconds between greetings
        #[arg(short, long, default_value_t = 1000)]
        interval_ms: u64,
    },

    /// Print the bytes of a frame built with the configured layout
    Pack {
        /// Route of the data frame
        #[arg(short, long, default_value_t = 1)]
        route: u32,

        /// Sequence number
        #[arg(short, long)]
        seq: Option<u32>,

        /// Payload text, written verbatim
        #[arg(short, long, default_value = "")]
        payload: String,

        /// Print a heartbeat frame instead
        #[arg(long)]
        heartbeat: bool,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Greeting exchanged with the demo server
#[derive(Debug, Serialize, Deserialize)]
struct Language {
    name: String,
    company: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging
    let filter = if let Some(directive) = &config.general.log_filter {
        EnvFilter::new(directive)
    } else if cli.verbose || config.general.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Connect {
            addr,
            route,
            interval_ms,
        } => {
            run_client(config, addr, route, interval_ms).await?;
        }
        Commands::Pack {
            route,
            seq,
            payload,
            heartbeat,
        } => {
            let packer = config.packer()?;
            let frame = if heartbeat {
                packer.pack_heartbeat()
            } else {
                packer.pack_message(route, seq, payload.as_bytes())?
            };
            println!("{}", hex(&frame));
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Run the demo client
async fn run_client(
    config: Config,
    addr: Option<String>,
    route: u32,
    interval_ms: u64,
) -> anyhow::Result<()> {
    let mut net_config = config.network.clone();
    if addr.is_some() {
        net_config.address = addr;
    }

    let client = Client::with_packer(net_config, config.packer()?);
    let disconnected = Arc::new(Notify::new());

    client.on_connect(|client| {
        tracing::info!("Connected to {:?}", client.config().address);
    });

    let notify = disconnected.clone();
    client.on_disconnect(move |_| {
        tracing::info!("Disconnected");
        notify.notify_one();
    });

    client.on_receive(|_, message| match message.data.as_typed::<Language>() {
        Ok(language) => tracing::info!(
            "Message from server; route: {}, seq: {}, language: {} ({})",
            message.route,
            message.seq,
            language.name,
            language.company
        ),
        Err(_) => tracing::info!(
            "Message from server; route: {}, seq: {}, {} bytes",
            message.route,
            message.seq,
            message.data.as_bytes().len()
        ),
    });

    client.on_heartbeat(|_, millisecond| {
        if let Some(ms) = millisecond {
            tracing::info!("Server time: {}ms", ms);
        }
    });

    client.connect().await?;

    let greeting = Language {
        name: "Rust".to_string(),
        company: "Rust Foundation".to_string(),
    };
    let mut seq: u32 = 0;
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));

    // Main event loop
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                seq = seq.wrapping_add(1);
                if !client.send_value(route, Some(seq), &greeting).await {
                    tracing::warn!("Greeting {} not sent", seq);
                }
            }
            _ = disconnected.notified() => {
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nDisconnecting...");
                client.disconnect().await;
                break;
            }
        }
    }

    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
