use anyhow::Context;
use clap::{Parser, Subcommand};
use pghealth::checker::{DiagnosticEngine, EngineSettings, Evaluation};
use pghealth::config::HealthConfig;
use pghealth::migration::MigrationGenerator;
use pghealth::models::Severity;
use pghealth::provider::{FileMetadataProvider, MetadataProvider};
use pghealth::registry::CheckRegistry;
use pghealth::reporter::{ReportFormat, Reporter};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// PostgreSQL schema health analyzer - finds index and constraint problems in a metadata snapshot
#[derive(Parser, Debug)]
#[command(name = "pghealth")]
#[command(version = "0.1.0")]
#[command(about = "PostgreSQL schema health analyzer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value = "markdown")]
    format: ReportFormat,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate every enabled check against a snapshot
    Analyze {
        /// Snapshot file (.json, .yaml or .yml)
        #[arg(short = 's', long = "snapshot")]
        snapshot: PathBuf,

        /// Path to YAML config file
        #[arg(short = 'c', long = "config", env = "PGHEALTH_CONFIG")]
        config: Option<PathBuf>,

        /// Exit with status 2 when a finding reaches this severity
        #[arg(long = "fail-on", value_enum)]
        fail_on: Option<Severity>,
    },
    /// Generate a migration script for the findings of a snapshot
    Migrate {
        /// Snapshot file (.json, .yaml or .yml)
        #[arg(short = 's', long = "snapshot")]
        snapshot: PathBuf,

        /// Path to YAML config file
        #[arg(short = 'c', long = "config", env = "PGHEALTH_CONFIG")]
        config: Option<PathBuf>,

        /// Write the script here instead of stdout
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// List the available checks
    Checks,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<HealthConfig> {
    match path {
        Some(path) => {
            info!("Loading config from: {}", path.display());
            HealthConfig::from_config_file(path)
                .with_context(|| format!("invalid config {}", path.display()))
        }
        None => Ok(HealthConfig::default()),
    }
}

fn evaluate(snapshot: &Path, config: &HealthConfig) -> anyhow::Result<Evaluation> {
    let mut registry = CheckRegistry::with_default_checks();
    registry.configure(config)?;
    let settings = EngineSettings::from_config(config)?;

    let snapshot = FileMetadataProvider::new(snapshot).snapshot()?;
    Ok(DiagnosticEngine::new(&registry, settings).evaluate(&snapshot))
}

fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Analyze {
            snapshot,
            config,
            fail_on,
        } => {
            info!("Analyzing snapshot: {}", snapshot.display());
            let config = load_config(config.as_deref())?;
            let evaluation = evaluate(&snapshot, &config)?;

            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            Reporter::new(cli.format).report(&evaluation, &mut handle)?;

            if let (Some(threshold), Some(worst)) = (fail_on, evaluation.max_severity()) {
                if worst >= threshold {
                    return Ok(ExitCode::from(2));
                }
            }
        }
        Commands::Migrate {
            snapshot,
            config,
            output,
        } => {
            info!("Generating migration for snapshot: {}", snapshot.display());
            let config = load_config(config.as_deref())?;
            let evaluation = evaluate(&snapshot, &config)?;

            let generator = MigrationGenerator::new(config.generator);
            let statements = generator.generate(&evaluation.findings);
            let script = generator.render_script(&statements);

            match output {
                Some(path) => {
                    fs::write(&path, script)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!("Wrote {} statements to {}", statements.len(), path.display());
                }
                None => std::io::stdout().lock().write_all(script.as_bytes())?,
            }
        }
        Commands::Checks => {
            let registry = CheckRegistry::with_default_checks();
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            for check in registry.all_checks() {
                writeln!(handle, "{:<42} {}", check.id(), check.description())?;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
