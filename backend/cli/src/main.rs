mod agent;
mod pairing_cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use screenlink_config::{config_dir, config_file_path, load_dotenv, load_or_create};
use screenlink_infra::{PairedSessionStore, PairingCodeStore};
use screenlink_logging::init_logger;

#[derive(Parser)]
#[command(name = "screenlink")]
#[command(about = "Pairs this display with a controller and keeps an encrypted link to it")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent: pair if needed, then stay connected to the controller
    Start {
        /// Reject every controller command
        #[arg(long)]
        disable_commands: bool,
        /// Port for the pairing HTTP server
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Inspect or reset pairing state
    Pairing {
        #[command(subcommand)]
        action: PairingAction,
    },
}

#[derive(Subcommand)]
enum PairingAction {
    /// Print the active pairing code
    Get {
        /// Keep polling and print whenever the code changes
        #[arg(short, long)]
        watch: bool,
    },
    /// Forget the pairing code and the paired controller
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    load_dotenv();

    let config_path = config_file_path(&config_dir());
    let mut config = load_or_create(&config_path).await?;
    init_logger(config.log_dir.as_deref(), &config.log_level);

    let code_store = PairingCodeStore::from_env();
    let paired_store = PairedSessionStore::from_env();

    match cli.command {
        Commands::Start {
            disable_commands,
            port,
        } => {
            config.disable_commands |= disable_commands;
            if let Some(port) = port {
                config.listen_port = port;
            }
            info!(
                client_id = %config.client_id,
                config = %config_path.display(),
                "Starting screenlink agent"
            );
            agent::run(config, code_store, paired_store).await?;
        }
        Commands::Pairing { action } => match action {
            PairingAction::Get { watch } => {
                if watch {
                    pairing_cmd::watch(&code_store, &paired_store).await?;
                } else {
                    println!("{}", pairing_cmd::describe(&code_store, &paired_store).await?);
                }
            }
            PairingAction::Reset => {
                let outcome = pairing_cmd::reset(&code_store, &paired_store).await?;
                println!("{outcome}");
            }
        },
    }

    Ok(())
}
