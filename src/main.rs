//! coldroll - air-gapped dice seeds and offline transaction signing
//!
//! # WARNING
//! - Run this only on a machine that never touches a network.
//! - The mnemonic shown on screen is the wallet. Anyone who sees it owns the funds.
//! - A forgotten seed password cannot be recovered.

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use coldroll::cli::commands::{self, RunMode, RunOutcome};
use coldroll::config::Config;
use coldroll::display::TerminalDisplay;
use coldroll::entropy::Bip39Codec;
use coldroll::input::TerminalInput;
use coldroll::signer::CommandLauncher;

/// coldroll - dice seeds and offline signing
#[derive(Parser)]
#[command(name = "coldroll")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "coldroll.toml", env = "COLDROLL_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new seed from dice rolls and log its public key
    Create,

    /// Restore a seed from its mnemonic and sign pending transactions
    Sign,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Logs go to stderr alongside the key display, never to stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("coldroll=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let mode = match cli.command {
        Some(Commands::Config) => return commands::show_config(&config),
        Some(Commands::Create) => RunMode::Create,
        Some(Commands::Sign) => RunMode::Sign,
        None => commands::choose_mode()?,
    };
    info!("Starting in {:?} mode", mode);

    let outcome = run(&config, mode).await?;
    match &outcome {
        RunOutcome::Success => {}
        RunOutcome::Aborted(reason) => eprintln!("\nAborted: {}", reason),
        RunOutcome::Fatal(reason) => eprintln!("\n{}", reason),
    }
    std::process::exit(outcome.exit_code());
}

async fn run(config: &Config, mode: RunMode) -> Result<RunOutcome> {
    let codec = Bip39Codec::new(config.entropy.hex_digits);
    let mut display = TerminalDisplay::new();
    let mut input = TerminalInput::new()?;

    let outcome = match mode {
        RunMode::Create => commands::run_create(config, &codec, &mut input, &mut display),
        RunMode::Sign => {
            let launcher = CommandLauncher::new(
                &config.signer.program,
                Duration::from_secs(config.signer.timeout_secs),
            );
            commands::run_sign(config, &codec, &mut input, &mut display, &launcher).await
        }
    };
    Ok(outcome)
}
