//! vflow CLI - Main Entry Point

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vflow_cli::commands::{init, list, run, Settings};
use vflow_cli::output;

/// vflow - declarative UI/API test workflows
#[derive(Parser)]
#[command(name = "vflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Engine configuration file
    #[arg(long, default_value = "vflow.toml", env = "VFLOW_CONFIG", global = true)]
    config: PathBuf,

    /// Testbed description, overrides the one named in the configuration
    #[arg(long, env = "VFLOW_TESTBED", global = true)]
    testbed: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available workflows
    List(list::ListArgs),

    /// Run workflows against the in-memory lab
    Run(run::RunArgs),

    /// Write default configuration and testbed files
    Init(init::InitArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::List(args) => list::execute(args, cli.format)?,
        Commands::Run(args) => {
            let settings = Settings::load(cli.config, cli.testbed)?;
            let report = run::execute(args, settings, cli.format).await?;
            if report.failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Init(args) => {
            let settings = Settings::load(cli.config, cli.testbed)?;
            init::execute(args, settings)?;
        }
        Commands::Version => {
            println!("vflow v{}", vflow_common::VERSION);
        }
    }

    Ok(())
}
