//! Core library for `weathertrack`.
//!
//! This crate defines:
//! - The target registry and observation model
//! - The OpenWeather provider and its bounded-retry fetcher
//! - The cycle coordinator and fixed-interval scheduler
//! - The deduplicated, time-sorted CSV history store
//! - Configuration & credentials handling
//!
//! It is used by `weathertrack-cli`; the history store can also be read by
//! other consumers without triggering any network activity.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod store;

pub use config::Config;
pub use coordinator::Coordinator;
pub use error::{FetchError, FetchFailure, StoreError};
pub use model::{Observation, Target, Units};
pub use provider::{WeatherProvider, openweather::OpenWeatherProvider, provider_from_config};
pub use registry::TargetRegistry;
pub use retry::{Fetcher, RetryPolicy};
pub use scheduler::{CycleReport, CycleState, Scheduler};
pub use store::{HistoryQuery, HistoryStore, MergeSummary};

use std::sync::Arc;

/// Wire a scheduler from config: provider, fetcher, coordinator and store.
///
/// Fails on a missing API key or an empty target table.
pub fn scheduler_from_config(config: &Config) -> anyhow::Result<Scheduler> {
    let registry = config.registry();
    if registry.is_empty() {
        anyhow::bail!(
            "No targets configured.\n\
             Hint: add entries under [targets] or remove the table."
        );
    }

    let provider = provider_from_config(config)?;
    let fetcher = Fetcher::new(Arc::new(provider), config.retry_policy());
    let coordinator = Coordinator::new(fetcher, config.issue_delay());

    Ok(Scheduler::new(
        registry,
        coordinator,
        HistoryStore::new(config.store_path.clone()),
        config.cycle_interval(),
    ))
}
