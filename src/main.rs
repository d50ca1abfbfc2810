//! CLI for msgrelay
//!
//! Subcommands:
//! - `serve`: run the relay behind its WebSocket ingress
//! - `submit`: send one message to a running relay
//! - `dead-letters`: print the recorded dead letters as JSON lines

use std::path::{Path, PathBuf};

use clap::Parser;
use msgrelay::client::RelayClient;
use msgrelay::config::{Settings, load_config_from};
use msgrelay::dispatcher::{Message, MessageId};
use msgrelay::persistence::Persistence;
use msgrelay::relay::Relay;
use msgrelay::transport::message::ServerMessage;
use msgrelay::transport::websocket::{bind, serve};
use msgrelay::utils::error::RelayError;
use msgrelay::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "msgrelay")]
enum Command {
    /// Start the relay and its WebSocket ingress
    Serve {
        /// Configuration file (default: config/default.toml, if present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Submit one message to a running relay
    Submit {
        /// WebSocket URL of the relay
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
        /// Message title
        #[arg(long)]
        title: String,
        /// Metadata entry as key=value; may be repeated
        #[arg(long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,
    },
    /// Print dead letters recorded by the relay
    DeadLetters {
        /// Configuration file naming the database path
        #[arg(long)]
        config: Option<PathBuf>,
        /// Only print the dead letter of this message id
        #[arg(long)]
        id: Option<MessageId>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cmd = Command::parse();

    let result = match cmd {
        Command::Serve { config } => run_server(config.as_deref()).await,
        Command::Submit {
            url,
            title,
            metadata,
        } => {
            logging::init("info");
            run_submit(&url, title, metadata).await
        }
        Command::DeadLetters { config, id } => run_dead_letters(config.as_deref(), id),
    };

    if let Err(e) = result {
        // no-op when the configured subscriber is already installed
        logging::init("info");
        error!("{}", e);
        std::process::exit(1);
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, RelayError> {
    let settings = load_config_from(path)?;
    logging::init(&settings.logging.level);
    Ok(settings)
}

async fn run_server(config: Option<&Path>) -> Result<(), RelayError> {
    let settings = load_settings(config)?;
    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    let listener = bind(&addr).await?;
    let persistence = Persistence::open(&settings.persistence.path)?;
    let relay = Relay::start(&settings, persistence).await?;

    let outcome = tokio::select! {
        _ = serve(listener, relay.gateway()) => Err(RelayError::ServerStopped),
        signal = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Draining in-flight messages.");
            signal.map_err(RelayError::from)
        }
    };

    for (channel, report) in relay.shutdown().await {
        info!(
            channel = %channel,
            drained = report.drained,
            persisted = report.persisted,
            acknowledged = report.stats.acknowledged,
            dead_lettered = report.stats.dead_lettered,
            "Stage stopped"
        );
    }
    outcome
}

async fn run_submit(
    url: &str,
    title: String,
    metadata: Vec<(String, String)>,
) -> Result<(), RelayError> {
    let message = metadata
        .into_iter()
        .fold(Message::new(title), |m, (k, v)| m.with_metadata(k, v));

    let mut client = RelayClient::connect(url).await?;
    let reply = client.submit(&message).await?;
    client.close().await?;

    match reply {
        ServerMessage::Accepted { submission_id, .. } => {
            println!("accepted {submission_id}");
            Ok(())
        }
        ServerMessage::Rejected { status, error, .. } => {
            Err(RelayError::Rejected { status, reason: error })
        }
    }
}

fn run_dead_letters(config: Option<&Path>, id: Option<MessageId>) -> Result<(), RelayError> {
    let settings = load_settings(config)?;
    let persistence = Persistence::open(&settings.persistence.path)?;

    let dead_letters = match id {
        Some(id) => persistence.find_dead_letter(id)?.into_iter().collect(),
        None => persistence.dead_letters()?,
    };

    for dead in dead_letters {
        match serde_json::to_string(&dead) {
            Ok(line) => println!("{line}"),
            Err(e) => error!(message_id = %dead.envelope.id(), error = %e, "Failed to encode dead letter"),
        }
    }
    Ok(())
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{s}`"))
}
