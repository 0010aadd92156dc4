//! CLI entry point: run the scheduling pipeline over one input batch.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use opsched::pipeline::run_pipeline;

#[derive(Debug, Parser)]
#[command(
    name = "opsched",
    about = "Schedule surgeries onto anesthesiologists and rooms at minimum staffing cost"
)]
struct Cli {
    /// Path to the YAML configuration.
    #[arg(long, default_value = "config/config.yaml")]
    config: PathBuf,

    /// Path to the surgeries CSV.
    #[arg(long, default_value = "data/surgeries.csv")]
    input: PathBuf,

    /// Output directory for artifacts.
    #[arg(long, default_value = "data/output")]
    output: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match std::panic::catch_unwind(|| run_pipeline(&cli.config, &cli.input, &cli.output)) {
        Ok(Ok(result)) => {
            info!(
                valid = result.valid,
                status = result.status.as_str(),
                output = %cli.output.display(),
                "artifacts written"
            );
            if result.valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Ok(Err(e)) => {
            error!(kind = e.kind(), "{e}");
            ExitCode::from(1)
        }
        Err(_) => {
            // the default panic hook has already printed the backtrace
            error!("unexpected crash");
            ExitCode::from(2)
        }
    }
}
