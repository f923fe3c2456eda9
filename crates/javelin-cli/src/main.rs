//! Javelin CLI - incremental JVM notebook kernel.

mod colors;
mod notebook;
mod resolve;
mod run;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use javelin_core::KernelConfig;

#[derive(Parser)]
#[command(name = "javelin")]
#[command(about = "Incremental JVM notebook kernel")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use only the local Maven repository and the artifact cache
    #[arg(long, global = true)]
    offline: bool,

    /// Directory for downloaded artifacts and the worker runtime
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// JDK to compile and run with
    #[arg(long, global = true)]
    java_home: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a notebook headlessly
    Run {
        /// Path to the notebook (percent-format .java file)
        notebook: String,

        /// Stop at the first failing cell
        #[arg(long)]
        fail_fast: bool,
    },

    /// Serve the kernel protocol as JSON lines on stdin/stdout
    Serve {
        /// Directory that relative %jars and %classpath paths resolve against
        #[arg(long, default_value = ".")]
        work_dir: PathBuf,
    },

    /// Resolve coordinates and print the resulting classpath
    Resolve {
        /// Coordinates (group:artifact[:packaging[:classifier]]:version)
        #[arg(required = true)]
        coordinates: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout belongs to the notebook output and protocol
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Helper to format javelin-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(javelin_err) = err.downcast_ref::<javelin_core::Error>() {
            anyhow::anyhow!("{}", javelin_err.with_hint())
        } else {
            err
        }
    };

    let config = build_config(&cli).map_err(format_error)?;

    match cli.command {
        Commands::Run {
            notebook,
            fail_fast,
        } => run::execute(&notebook, &config, fail_fast).await.map_err(format_error)?,

        Commands::Serve { work_dir } => {
            serve::execute(&work_dir, &config).await.map_err(format_error)?;
        }

        Commands::Resolve { coordinates } => {
            resolve::execute(&coordinates, &config).await.map_err(format_error)?;
        }
    }

    Ok(())
}

/// Environment configuration with command-line overrides applied.
fn build_config(cli: &Cli) -> anyhow::Result<KernelConfig> {
    let mut config = KernelConfig::from_env()?;
    if cli.offline {
        config.offline = true;
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(home) = &cli.java_home {
        config.java_home = Some(home.clone());
    }
    Ok(config)
}
