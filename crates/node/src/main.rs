// node/src/main.rs
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "darknode")]
#[command(about = "Darknode registry and payment node", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node
    Start {
        /// Configuration file path
        #[arg(short, long, default_value = "./data/config.toml")]
        config: String,

        /// Override data directory
        #[arg(short, long)]
        data_dir: Option<String>,
    },

    /// Initialize a new node with a fresh owner key
    Init {
        /// Data directory
        #[arg(short, long, default_value = "./data")]
        data_dir: String,
    },

    /// Show the persisted engine status
    Status {
        /// Configuration file path
        #[arg(short, long, default_value = "./data/config.toml")]
        config: String,
    },

    /// Generate a darknode keypair
    Keygen {
        /// Output path
        #[arg(short, long)]
        output: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},registry={},payment={},storage={}", log_level, log_level, log_level, log_level).into())
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Start { config, data_dir } => {
            start_node(&config, data_dir).await?;
        }
        Commands::Init { data_dir } => {
            init_node(&data_dir)?;
        }
        Commands::Status { config } => {
            show_status(&config)?;
        }
        Commands::Keygen { output } => {
            write_keypair(&output)?;
        }
    }

    Ok(())
}

async fn start_node(config_path: &str, data_dir_override: Option<String>) -> anyhow::Result<()> {
    use node::{Node, NodeConfig};
    use std::sync::Arc;

    tracing::info!("Loading configuration from {}", config_path);
    let mut config = NodeConfig::from_file(config_path)?;

    if let Some(data_dir) = data_dir_override {
        config.data_dir = data_dir;
    }

    tracing::info!("Starting node with data directory: {}", config.data_dir);

    let node = Arc::new(Node::new(config)?);
    node.clone().start().await?;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    node.stop().await?;
    tracing::info!("Node stopped gracefully");

    Ok(())
}

fn init_node(data_dir: &str) -> anyhow::Result<()> {
    tracing::info!("Initializing node at {}", data_dir);

    std::fs::create_dir_all(data_dir)?;
    std::fs::create_dir_all(format!("{}/db", data_dir))?;
    std::fs::create_dir_all(format!("{}/keys", data_dir))?;

    let owner = write_keypair(&format!("{}/keys/owner.json", data_dir))?;

    let mut config = node::NodeConfig::default();
    config.data_dir = data_dir.to_string();
    config.registry.owner = owner.to_hex();
    config.to_file(&format!("{}/config.toml", data_dir))?;

    tracing::info!("Node initialized successfully at {}", data_dir);
    tracing::info!("Edit {}/config.toml to configure your node", data_dir);

    Ok(())
}

fn write_keypair(output: &str) -> anyhow::Result<darknode_crypto::Address> {
    use darknode_crypto::KeyPair;

    tracing::info!("Generating keypair");
    let keypair = KeyPair::generate();
    let address = keypair.public_key().to_address();

    let key_json = serde_json::json!({
        "public_key": keypair.public_key().to_hex(),
        "secret_key": keypair.secret_hex(),
        "address": address.to_hex(),
    });

    std::fs::write(output, serde_json::to_string_pretty(&key_json)?)?;
    tracing::info!("Keypair for {} saved to {}", address, output);
    tracing::warn!("Keep this file secure!");

    Ok(address)
}

fn show_status(config_path: &str) -> anyhow::Result<()> {
    use node::{DarknodeEngine, NodeConfig};
    use storage::Database;

    let config = NodeConfig::from_file(config_path)?;
    let database = Database::open(config.database_config())?;

    match database.load_snapshot()? {
        Some(snapshot) => {
            let engine = DarknodeEngine::from_snapshot(snapshot)?;
            println!("{}", serde_json::to_string_pretty(&engine.status())?);
        }
        None => tracing::info!("No engine state at {}", database.path()),
    }

    Ok(())
}
