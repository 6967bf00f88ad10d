//! Testdeck - Main Server
//!
//! Test-case management backend with projects, memberships, invitations,
//! test scenarios, executions and bug tracking.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use testdeck::{db::Db, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "testdeck")]
#[command(about = "Test-case management server")]
struct Cli {
    /// Path to the YAML config file (default: config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Open the database and apply pending migrations, then exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,testdeck=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            testdeck::start_server(config).await
        }
        Commands::Migrate => {
            let _db = Db::connect(&config.database_url).await?;
            tracing::info!("Database is up to date at {}", config.database_url);
            Ok(())
        }
    }
}
