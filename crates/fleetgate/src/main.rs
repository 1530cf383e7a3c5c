//! Fleetgate CLI
//!
//! Inspect configuration and run access decisions from JSON files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleetgate::config::{ConfigLoader, FleetgateConfig};
use fleetgate::{
    AccessControlService, Action, PartialResourceContext, Principal, QueryOperation,
    ResourceContext,
};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

/// How long to wait for audit delivery before exiting.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "fleetgate")]
#[command(version, about = "Fleet access control decisions and policy inspection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding fleetgate.toml (defaults to the current directory)
    #[arg(short = 'C', long, global = true)]
    project_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load configuration and validate the ownership matrix
    CheckConfig,

    /// Print the effective ownership matrix as JSON
    Matrix,

    /// Evaluate a single access request
    Evaluate {
        /// JSON file with `principal`, `resource`, `action` and an optional
        /// `correlation_id`
        #[arg(short, long)]
        request: PathBuf,
    },

    /// Print the access policy for a principal
    Policy {
        /// JSON file with the principal
        #[arg(short, long)]
        principal: PathBuf,

        /// JSON file narrowing ownership type, region or classification
        #[arg(short, long)]
        context: Option<PathBuf>,
    },

    /// Print the row filter for a bulk operation
    Filter {
        /// JSON file with the principal
        #[arg(short, long)]
        principal: PathBuf,

        /// Bulk operation (read, create, update, delete)
        #[arg(short, long)]
        operation: QueryOperation,

        /// JSON file narrowing ownership type, region or classification
        #[arg(short, long)]
        context: Option<PathBuf>,
    },
}

#[derive(Deserialize)]
struct EvaluateRequest {
    principal: Principal,
    resource: ResourceContext,
    action: Action,
    #[serde(default)]
    correlation_id: Option<Uuid>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let mut loader = ConfigLoader::new();
    if let Some(dir) = &cli.project_dir {
        loader = loader.with_project_dir(dir);
    }

    match cli.command {
        Commands::CheckConfig => check_config(loader)?,
        Commands::Matrix => {
            let config = loader.load()?;
            let matrix = config.policy.load_matrix()?;
            print_json(&matrix)?;
        }
        Commands::Evaluate { request } => {
            let service = start(loader)?;
            let EvaluateRequest {
                principal,
                resource,
                action,
                correlation_id,
            } = read_json(&request)?;
            let decision = match correlation_id {
                Some(id) => service.evaluate_correlated(&principal, &resource, action, id),
                None => service.evaluate(&principal, &resource, action),
            };
            print_json(&decision)?;
            service.shutdown(SHUTDOWN_TIMEOUT);
        }
        Commands::Policy { principal, context } => {
            let service = start(loader)?;
            let principal: Principal = read_json(&principal)?;
            let context = read_context(context.as_deref())?;
            print_json(&service.get_access_policy(&principal, &context))?;
            service.shutdown(SHUTDOWN_TIMEOUT);
        }
        Commands::Filter {
            principal,
            operation,
            context,
        } => {
            let service = start(loader)?;
            let principal: Principal = read_json(&principal)?;
            let context = read_context(context.as_deref())?;
            print_json(&service.build_query_filter(&principal, operation, &context))?;
            service.shutdown(SHUTDOWN_TIMEOUT);
        }
    }

    Ok(())
}

fn start(loader: ConfigLoader) -> Result<AccessControlService> {
    let config = loader.load()?;
    AccessControlService::from_config(&config).context("Failed to start access control service")
}

fn check_config(loader: ConfigLoader) -> Result<()> {
    let sources = loader.sources();
    let config: FleetgateConfig = loader.load()?;
    let matrix = config.policy.load_matrix()?;

    if sources.is_empty() {
        println!("No config files found; using built-in defaults");
    }
    for source in &sources {
        println!("✓ {}", source.display());
    }
    match &config.policy.matrix_file {
        Some(path) => println!("✓ Ownership matrix: {}", path.display()),
        None => println!("✓ Ownership matrix: built-in"),
    }
    println!("  {} ownership rows validated", matrix.rows().len());
    println!(
        "  cache: {} (ttl {}s)",
        if config.cache.enabled { "enabled" } else { "disabled" },
        config.cache.ttl_secs
    );
    println!(
        "  audit: {:?} sink, queue {} / batch {}",
        config.audit.sink, config.audit.queue_capacity, config.audit.batch_size
    );

    info!("Configuration is valid");
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn read_context(path: Option<&Path>) -> Result<PartialResourceContext> {
    path.map_or_else(|| Ok(PartialResourceContext::new()), read_json)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}
