mod config;
mod server;
mod telemetry;

use clap::{Parser, Subcommand};
use config::Config;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "arbiter", version, about = "Policy decision proxy")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the proxy and admin listeners
    Run {
        #[arg(long, short)]
        config: PathBuf,
    },
    /// Load and validate a config file, then exit
    CheckConfig {
        #[arg(long, short)]
        config: PathBuf,
    },
}

fn load_config(path: &Path) -> Result<Config, String> {
    let config = Config::from_file(path).map_err(|e| e.to_string())?;
    config
        .validate()
        .map_err(|e| format!("invalid config: {e}"))?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        CliCommand::CheckConfig { config } => match load_config(&config) {
            Ok(_) => {
                println!("{} is valid", config.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        },
        CliCommand::Run { config } => {
            let config = match load_config(&config) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{e}");
                    return ExitCode::FAILURE;
                }
            };
            run(config)
        }
    }
}

fn run(config: Config) -> ExitCode {
    // Sentry has to be initialized before the runtime starts
    let _sentry = telemetry::init_logging(&config.logging);

    if let Some(metrics) = &config.metrics {
        if let Err(e) = telemetry::init_metrics(metrics) {
            tracing::error!(error = %e, "Could not set up metrics");
            return ExitCode::FAILURE;
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Could not start the runtime");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Starting arbiter");
    match runtime.block_on(server::run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Arbiter stopped");
            ExitCode::FAILURE
        }
    }
}
