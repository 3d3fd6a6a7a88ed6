//! Tether CLI - load, inspect and run guests on the foreign memory bridge.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tether_runtime::observability::{LogFormat, TracingConfig, TracingGuard, init_tracing};

/// Tether - host a wasm-bindgen style guest outside the browser.
#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, instantiate and finalize a guest module
    Run {
        /// Path or http(s) URL of the module
        module: String,

        /// Bridge configuration YAML (runtime settings and closure adapters)
        #[arg(short, long)]
        config: Option<String>,

        /// Nullary export to call after finalize
        #[arg(short, long)]
        invoke: Option<String>,
    },

    /// List a module's imports and exports and check adapter coverage
    Inspect {
        /// Path or http(s) URL of the module
        module: String,

        /// Bridge configuration YAML
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Validate a bridge configuration file
    Validate {
        /// Path to the configuration YAML
        file: String,
    },

    /// Show version information
    Version,
}

fn setup_logging(verbosity: u8) -> Result<TracingGuard> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let log_format = std::env::var("TETHER_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse::<LogFormat>().ok())
        .unwrap_or_else(|| {
            if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
                LogFormat::Pretty
            } else {
                LogFormat::Compact
            }
        });

    let log_filter = std::env::var("TETHER_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| filter.to_string());

    let config = TracingConfig::builder()
        .log_format(log_format)
        .log_filter(log_filter)
        .build();

    init_tracing(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _tracing_guard = setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Run {
            module,
            config,
            invoke,
        } => commands::run::run(&module, config.as_deref(), invoke.as_deref()).await,
        Commands::Inspect { module, config } => {
            commands::inspect::run(&module, config.as_deref()).await
        }
        Commands::Validate { file } => commands::validate::run(&file),
        Commands::Version => commands::version::run(),
    }
}
