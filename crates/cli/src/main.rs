use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use db::SqliteDataStore;
use idp_core::{OperationalDataStore, ProcessExecutor, ServiceType};
use orchestrator::{
    IdpConfig, LifecycleOrchestrator, RunReport, ServiceLease, StepOutcome, TerminalState,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vcs::GitVcs;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "idp=info,orchestrator=info,vcs=info,idp_core=info,db=info";

#[derive(Parser)]
#[command(name = "idp")]
#[command(about = "Provision and decommission platform services", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root of the platform repository (defaults to the current directory)
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// Print the run report as JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration to .idp/config.toml
    Init,
    /// Scaffold, build, deploy and publish a new service
    CreateService {
        name: String,
        coin: String,
        #[arg(value_name = "TYPE")]
        service_type: ServiceType,
        /// Remove a leftover lock for this service before running
        #[arg(long)]
        force_unlock: bool,
    },
    /// Remove a service and everything it owns
    RmService {
        name: String,
        coin: String,
        #[arg(value_name = "TYPE")]
        service_type: ServiceType,
        /// Remove a leftover lock for this service before running
        #[arg(long)]
        force_unlock: bool,
    },
    /// Delete a coin's records from a local operational datastore
    PurgeRecords {
        #[arg(long)]
        symbol: String,
        /// SQLite URL, e.g. sqlite:/data/crypto.db
        #[arg(long)]
        database: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let repo = match cli.repo {
        Some(repo) => repo,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Init => init_repository(&repo).await,
        Commands::CreateService {
            name,
            coin,
            service_type,
            force_unlock,
        } => {
            preflight(&["git", "kubectl", "docker", "kind"])?;
            unlock_if_requested(&repo, &name, force_unlock)?;
            let orchestrator = orchestrator(&repo).await?;
            let report = orchestrator
                .create_service(&name, &coin, service_type)
                .await
                .with_context(|| format!("create-service {} failed", name))?;
            print_report(&report, cli.json)
        }
        Commands::RmService {
            name,
            coin,
            service_type,
            force_unlock,
        } => {
            preflight(&["git", "kubectl"])?;
            unlock_if_requested(&repo, &name, force_unlock)?;
            let orchestrator = orchestrator(&repo).await?;
            let report = orchestrator
                .remove_service(&name, &coin, service_type)
                .await
                .with_context(|| format!("rm-service {} failed", name))?;
            print_report(&report, cli.json)
        }
        Commands::PurgeRecords { symbol, database } => purge_records(&symbol, &database).await,
    }
}

async fn orchestrator(repo: &Path) -> Result<LifecycleOrchestrator> {
    LifecycleOrchestrator::for_repository(repo, Arc::new(ProcessExecutor::new()))
        .await
        .with_context(|| format!("Failed to load configuration from {}", repo.display()))
}

fn unlock_if_requested(repo: &Path, service: &str, force_unlock: bool) -> Result<()> {
    if force_unlock && ServiceLease::force_unlock(repo, service)? {
        println!("{} removed leftover lock for {}", "warning:".yellow(), service);
    }
    Ok(())
}

async fn init_repository(repo: &Path) -> Result<()> {
    let config_path = IdpConfig::path(repo);
    if config_path.exists() {
        println!("Already initialized at {}", config_path.display());
        return Ok(());
    }

    let mut config = IdpConfig::default();
    let git = GitVcs::new(repo.to_path_buf(), Arc::new(ProcessExecutor::new()))
        .with_remote(config.repository.remote.clone());
    match git.remote_url().await {
        Some(url) => config.repository.repo_url = url,
        None => println!(
            "{} no '{}' remote found; set repository.repo_url before creating services",
            "warning:".yellow(),
            config.repository.remote
        ),
    }

    config
        .write(repo)
        .await
        .context("Failed to write configuration")?;

    println!("Wrote {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Review repository and cluster settings in the file above");
    println!("  2. Run 'idp create-service <name> <coin> <collector|ingestor>'");
    Ok(())
}

async fn purge_records(symbol: &str, database: &str) -> Result<()> {
    let pool = db::open(database)
        .await
        .with_context(|| format!("Failed to open {}", database))?;
    let removed = SqliteDataStore::new(pool)
        .delete_records(&symbol.to_ascii_uppercase())
        .await?;
    println!("Removed {} {} records", removed, symbol.to_ascii_uppercase());
    Ok(())
}

/// Fail early when a required tool is missing; `terraform` only warns.
fn preflight(required: &[&str]) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|tool| which::which(tool).is_err())
        .collect();
    if !missing.is_empty() {
        bail!("Required tools not found on PATH: {}", missing.join(", "));
    }

    if which::which("terraform").is_err() {
        tracing::warn!("terraform not found; dashboard steps will only warn");
    }
    Ok(())
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    println!("{} ({})", report.service.bold(), report.run_id);
    println!("════════════════════════════════════════");
    for record in &report.steps {
        let (icon, detail) = match &record.outcome {
            StepOutcome::Completed(detail) => ("✓".green(), detail.as_str().normal()),
            StepOutcome::NoOp(detail) => ("○".blue(), detail.as_str().dimmed()),
            StepOutcome::Warned(detail) => ("!".yellow(), detail.as_str().yellow()),
        };
        println!("  {} {:<28} {}", icon, record.step.to_string(), detail);
    }
    println!();

    if let Some(records) = report.removed_records {
        println!("Removed {} datastore records", records);
    }
    match &report.terminal {
        Some(TerminalState::RemovedWithWarnings { stuck }) => {
            println!("{}", "Removed with warnings".yellow().bold());
            for resource in stuck {
                println!("  still present: {}", resource);
            }
        }
        Some(terminal) => println!("{}", terminal.to_string().green().bold()),
        None => {}
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .init();
}
