use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vpnscope_core::verdict::AlgorithmMethod;

mod commands;
use commands::{check_keys, handle_config_command, utils::print_error, CheckOptions, ConfigCommands};

#[derive(Parser)]
#[command(name = "vpnscope-cli")]
#[command(about = "vpnscope CLI - check IP addresses and player ids against reputation sources")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check one or more keys (IP addresses or player UUIDs)
    Check {
        /// Keys to check
        #[arg(required = true)]
        keys: Vec<String>,

        /// Path to config file (defaults to $VPNSCOPE_CONFIG or config/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured algorithm (consensus or cascade)
        #[arg(short, long)]
        algorithm: Option<AlgorithmMethod>,

        /// Print verdicts as JSON
        #[arg(long)]
        json: bool,

        /// Print Prometheus metrics after the checks
        #[arg(long)]
        metrics: bool,
    },

    /// Configuration Management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { keys, config, algorithm, json, metrics } => {
            check_keys(CheckOptions { keys, config, algorithm, json, metrics }).await
        }
        Commands::Config(config_command) => handle_config_command(config_command),
    };

    if let Err(e) = result {
        print_error(&e.to_string());
        std::process::exit(1);
    }
}
