//! mongo-sql-migrate CLI - one-shot MongoDB content store to SQL migration.

use clap::{Parser, Subcommand};
use mongo_sql_migrate::store::connect_source;
use mongo_sql_migrate::{Config, MemoryTarget, MigrateError, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "mongo-sql-migrate")]
#[command(about = "One-shot migration of a MongoDB content store into a relational schema")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration
    Run {
        /// Read the source and materialize into memory without touching the target
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the ordered model registry and its relation plan
    Models,

    /// Test source and target connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run { dry_run } => {
            let orchestrator = if dry_run {
                info!("Dry run: rows are materialized in memory only");
                offline(config).await?
            } else {
                Orchestrator::new(config).await?
            };

            let result = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                let status_msg = if dry_run { "Dry run completed!" } else { "Migration completed!" };
                println!("\n{}", status_msg);
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Models: {}", result.models_total);
                println!("  Rows: {}", result.rows_inserted);
                println!("  Links: {}", result.links_inserted);
                println!("  Foreign keys: {}", result.keys_updated);
            }
        }

        Commands::Models => {
            let orchestrator = offline(config).await?;
            let models = orchestrator.describe_models().await;
            orchestrator.close().await;
            let models = models?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else {
                for (idx, model) in models.iter().enumerate() {
                    println!(
                        "{:>3}. {} -> {} ({}, {} scalar attributes)",
                        idx + 1,
                        model.uid,
                        model.collection_name,
                        model.global_type_name,
                        model.scalar_attributes
                    );
                    for link in &model.links {
                        match &link.table {
                            Some(table) => {
                                println!("       {:<24} {:<20} {}", link.attribute, link.relation, table)
                            }
                            None => println!("       {:<24} {}", link.attribute, link.relation),
                        }
                    }
                }
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await;
            orchestrator.close().await;
            let result = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({}): {} ({}ms)",
                    result.source_type,
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target ({}): {} ({}ms)",
                    result.target_dialect,
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::Config("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

/// Orchestrator over the configured source and an in-memory target.
async fn offline(config: Config) -> Result<Orchestrator, MigrateError> {
    let source = connect_source(&config).await?;
    Ok(Orchestrator::with_stores(
        config,
        source,
        Arc::new(MemoryTarget::new()),
    ))
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
