use std::path::PathBuf;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Local, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use inquire::Password;
use tracing::{error, info};
use weathertrack_core::{
    Config, HistoryQuery, HistoryStore, Observation, scheduler_from_config,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weathertrack", version, about = "Scheduled weather collector")]
pub struct Cli {
    /// Path to the config file (defaults to the platform config directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Collect every interval until stopped or the store fails.
    Run,

    /// Run a single collection cycle and exit.
    Once,

    /// Print stored observations without fetching anything.
    History {
        /// Only show this city.
        #[arg(long)]
        city: Option<String>,

        /// Only show observations from the last N hours.
        #[arg(long)]
        hours: Option<u32>,
    },

    /// List the cities polled each cycle.
    Targets,

    /// Store the OpenWeather API key in the config file.
    Configure,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let path = self.config.as_deref();
        let mut config = Config::load(path)?;
        config.apply_env();

        match self.command {
            Command::Run => {
                let mut scheduler = scheduler_from_config(&config)?;
                info!(
                    "collecting {} targets every {}s into {}",
                    config.registry().len(),
                    config.cycle_interval_secs,
                    config.store_path.display()
                );

                tokio::select! {
                    res = scheduler.run_forever() => {
                        if let Err(e) = res {
                            error!("collector stopped: {e}");
                            return Err(e).context("History store failure");
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("interrupted after {} cycles", scheduler.cycles());
                    }
                }
            }
            Command::Once => {
                let mut scheduler = scheduler_from_config(&config)?;
                let report = scheduler.run_once().await.context("History store failure")?;
                println!(
                    "Fetched {}/{} targets ({} failed); store now has {} rows ({} dropped on load).",
                    report.succeeded,
                    report.attempted,
                    report.failed,
                    report.merge.written,
                    report.merge.dropped,
                );
            }
            Command::History { city, hours } => {
                let store = HistoryStore::new(config.store_path.clone());
                let since = hours.map(history_start).transpose()?;
                let query = HistoryQuery { location: city, since };
                let rows = store.query(&query)?;
                if rows.is_empty() {
                    println!("No observations in {}.", store.path().display());
                }
                for obs in &rows {
                    println!("{}", format_row(obs));
                }
            }
            Command::Targets => {
                for target in config.registry().iter() {
                    println!("{:<16} {}", target.region, target.location);
                }
            }
            Command::Configure => {
                let key = Password::new("OpenWeather API key:")
                    .without_confirmation()
                    .prompt()
                    .context("Failed to read API key")?;
                config.set_api_key(key.trim().to_string());
                config.require_api_key()?;
                config.save(path)?;
                println!("Saved API key.");
            }
        }

        Ok(())
    }
}

/// Start of a window reaching `hours` back from now.
fn history_start(hours: u32) -> anyhow::Result<DateTime<Utc>> {
    TimeDelta::try_hours(i64::from(hours))
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(|| anyhow!("--hours {hours} reaches past the earliest representable time"))
}

fn format_row(obs: &Observation) -> String {
    format!(
        "{}  {:<14} {:<16} {:>6.1}°F {:>5.0}% {:>5.1} mph  {}",
        obs.observed_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        obs.location,
        obs.region,
        obs.temperature_f,
        obs.humidity_pct,
        obs.wind_speed_mph,
        obs.description,
    )
}
