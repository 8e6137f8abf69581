//! Ad rotation CLI.
//!
//! This tool provides commands for:
//! - Running the configured rotation surfaces headlessly
//! - Validating configuration files
//! - Printing the merged configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod config;
mod error;
mod host;

use error::CliError;

#[derive(Parser)]
#[command(name = "adreel")]
#[command(about = "Ad rotation service host and configuration tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured surface, logging slide changes
    Run {
        /// Path to the TOML configuration file
        #[arg(long, short, env = "ADREEL_CONFIG")]
        file: PathBuf,

        /// Stop after this many seconds instead of waiting for ctrl-c
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Report the network as unavailable
        #[arg(long)]
        offline: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate config against settings validation
    Validate {
        /// Path to the TOML configuration file
        #[arg(long, short)]
        file: PathBuf,
    },

    /// Print the config after merging environment overrides
    Show {
        /// Path to the TOML configuration file
        #[arg(long, short)]
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "toml")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum OutputFormat {
    Toml,
    Json,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Run {
            file,
            duration_secs,
            offline,
        } => host::run(&file, duration_secs, offline, cli.verbose),
        Commands::Config { action } => match action {
            ConfigAction::Validate { file } => config::validate(&file, cli.verbose),
            ConfigAction::Show { file, format } => config::show(&file, format, cli.verbose),
        },
    }
}
