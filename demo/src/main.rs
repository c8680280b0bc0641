//! skillgate Home-Services Reference Runtime: Demo CLI
//!
//! Runs one or all of the four home-services scenarios. Each scenario starts
//! a real execution kernel (default policy set, JSON Schema validator,
//! hash-chained audit sink) and drives it with mock bookings and payments.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- booking
//!   cargo run -p demo -- approval
//!   cargo run -p demo -- breaker
//!   cargo run -p demo -- saga
//!   cargo run -p demo -- --config kernel.toml run-all
//!   cargo run -p demo -- --database sqlite://skillgate.db run-all

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use skillgate_contracts::error::GovernanceResult;
use skillgate_core::KernelConfig;
use skillgate_ref_services::{
    runtime::demo_config,
    scenarios::{approval, booking, breaker, saga},
};

// ── CLI definition ────────────────────────────────────────────────────────────

/// skillgate: governed skill execution for a home-services platform.
///
/// Each subcommand runs one or all of the reference scenarios, showing policy
/// admission, approval workflows, circuit breaking, sagas and audit integrity.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "skillgate home-services reference runtime demo",
    long_about = "Runs skillgate reference scenarios showing policy admission, schema validation,\n\
                  approval workflows, circuit breakers, saga compensation and audit chain integrity."
)]
struct Cli {
    /// Kernel settings as TOML. Defaults to the bundled demo settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite URL for the durable job store. Overrides `store.database_url`.
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all four scenarios in sequence.
    RunAll,
    /// Scenario 1: Booking Assistant (sync, async, schema rejection).
    Booking,
    /// Scenario 2: High-Value Payment (approval, resume, reject, expire).
    Approval,
    /// Scenario 3: Provider Directory Outage (circuit breaker).
    Breaker,
    /// Scenario 4: Book-and-Pay Saga (reverse-order compensation).
    Saga,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match load_config(cli.config) {
        Ok(mut config) => {
            if let Some(url) = cli.database {
                config.store.database_url = Some(url);
            }
            run(cli.command, config).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<PathBuf>) -> GovernanceResult<KernelConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading kernel config");
            KernelConfig::from_file(&path)
        }
        None => {
            let mut config = demo_config()?;
            config.apply_env_overrides()?;
            Ok(config)
        }
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

async fn run(command: Command, config: KernelConfig) -> GovernanceResult<()> {
    match command {
        Command::RunAll => {
            booking::run_scenario(config.clone()).await?;
            approval::run_scenario(config.clone()).await?;
            breaker::run_scenario(config.clone()).await?;
            saga::run_scenario(config).await
        }
        Command::Booking => booking::run_scenario(config).await,
        Command::Approval => approval::run_scenario(config).await,
        Command::Breaker => breaker::run_scenario(config).await,
        Command::Saga => saga::run_scenario(config).await,
    }
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("skillgate — Governed Skill Execution");
    println!("Home-Services Reference Demo");
    println!("====================================");
    println!();
    println!("skillgate pipeline per invocation:");
    println!("  [1] Circuit breaker: fail fast while the skill is unhealthy");
    println!("  [2] Policy engine: allow / deny / require approval (first matching rule wins)");
    println!("  [3] Job queue: async callers get a job id, sync callers wait (bounded)");
    println!("  [4] Worker: input schema → executor → output schema");
    println!("  [5] Breaker update + audit entries appended to a SHA-256 hash chain");
    println!();
}
