use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dpos_consensus::DposController;
use dpos_network::NetworkCommand;
use dpos_node::{init_tracing, open_store, Devnet, DposService, NodeConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, info};

/// Masternode dPoS consensus node
#[derive(Parser, Debug)]
#[command(name = "dpos-node")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, env = "DPOS_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level filter (overrides config, not RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a standalone node on a synthetic devnet (default)
    Run,
    /// Write a default configuration file
    InitConfig {
        #[arg(short, long, default_value = "dpos-node.toml")]
        output: PathBuf,
    },
}

impl Cli {
    fn load_config(&self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?,
            None => NodeConfig::default(),
        };

        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::InitConfig { ref output }) => {
            NodeConfig::default().save(output)?;
            println!("Wrote default configuration to {}", output.display());
            Ok(())
        }
        Some(Command::Run) | None => run(cli.load_config()?).await,
    }
}

async fn run(config: NodeConfig) -> Result<()> {
    init_tracing(&config.logging)?;
    info!(
        data_dir = %config.data_dir.display(),
        storage = ?config.storage,
        team_size = config.consensus.team_size,
        "dPoS node starting"
    );

    let store = open_store(&config)?;
    let Devnet {
        collaborators,
        commands,
        ..
    } = Devnet::build(&config, store)?;

    let controller = Arc::new(DposController::new(config.consensus.clone(), collaborators)?);
    let service = DposService::start(controller.clone())?;
    let transport = tokio::spawn(drain_commands(commands));

    signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    let status = controller.status();
    info!(
        voter = status.voter,
        round = status.round,
        round_votes = status.round_votes,
        tx_votes = status.tx_votes,
        "Final dPoS status"
    );

    service.shutdown().await;
    transport.abort();
    Ok(())
}

/// Standalone nodes have no transport; outbound traffic is only logged
async fn drain_commands(mut commands: tokio::sync::mpsc::UnboundedReceiver<NetworkCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            NetworkCommand::Announce(inventory) => {
                debug!("Announce {:?} {}", inventory.kind, inventory.hash)
            }
            NetworkCommand::Send { peer, message } => {
                debug!("Send {} to {}", message.name(), peer)
            }
        }
    }
}
