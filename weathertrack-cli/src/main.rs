//! Binary crate for the `weathertrack` collector.
//!
//! This crate focuses on:
//! - Process bootstrap (logging, `.env`, configuration)
//! - Parsing CLI arguments
//! - Human-friendly output of the stored history

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;

fn init_logging(verbose: bool) {
    let default = if verbose {
        "weathertrack_core=debug,weathertrack=debug"
    } else {
        "weathertrack_core=info,weathertrack=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // a missing .env is fine
    dotenv::dotenv().ok();

    let cmd = cli::Cli::parse();
    init_logging(cmd.verbose);
    cmd.run().await
}
