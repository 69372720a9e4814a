use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zonewatch::delivery::payload::DeliveryMode;

#[derive(Parser)]
#[command(name = "zonewatch")]
#[command(about = "Log-tail zone tracker with reliable delivery", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch log files and deliver zone changes (default)
    Run,
    /// One-shot scan of all cataloged sources, then send
    Scan {
        /// Write the full-snapshot blob to a file instead of posting it
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Send an externally supplied JSON blob through the delivery path
    Send {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = ModeArg::DirectImport)]
        mode: ModeArg,
    },
    /// Send one character's inventory file to the backend
    SendInventory { character: String },
    /// Run the edge retry-queue server
    Edge,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    DirectImport,
    StoreJson,
}

impl From<ModeArg> for DeliveryMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::DirectImport => DeliveryMode::DirectImport,
            ModeArg::StoreJson => DeliveryMode::StoreJson,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zonewatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config_path = zonewatch::config::resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Run) | None => {
            zonewatch::cli::run::run(config_path).await?;
        }
        Some(Commands::Scan { export }) => {
            zonewatch::cli::actions::scan(config_path, export).await?;
        }
        Some(Commands::Send { file, mode }) => {
            zonewatch::cli::actions::send_file(config_path, &file, mode.into()).await?;
        }
        Some(Commands::SendInventory { character }) => {
            zonewatch::cli::actions::send_inventory(config_path, &character).await?;
        }
        Some(Commands::Edge) => {
            zonewatch::cli::edge::run(config_path).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                zonewatch::cli::config::init(stdout)?;
            }
        },
    }

    Ok(())
}
