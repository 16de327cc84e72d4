//! Bounded-retry wrapper around a [`WeatherProvider`].

use std::{sync::Arc, time::Duration};

use tracing::{debug, error, instrument, warn};

use crate::{
    error::{FetchError, FetchFailure},
    model::{Observation, Target},
    provider::WeatherProvider,
};

/// Fixed attempt budget with a constant pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// Fetches one target at a time, retrying failed attempts.
#[derive(Debug, Clone)]
pub struct Fetcher {
    provider: Arc<dyn WeatherProvider>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(provider: Arc<dyn WeatherProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    /// Fetch `target`, attempting up to `max_attempts` times.
    ///
    /// The failure is logged here; callers only decide whether to keep it.
    #[instrument(skip_all, fields(region = %target.region, location = %target.location))]
    pub async fn fetch(&self, target: &Target) -> Result<Observation, FetchFailure> {
        let max = self.policy.max_attempts;
        let mut attempt = 1;

        loop {
            match self.provider.current(target).await {
                Ok(obs) => {
                    debug!(attempt, "fetched observation at {}", obs.observed_at);
                    return Ok(obs);
                }
                Err(e) if attempt < max => {
                    warn!(attempt, "attempt {attempt}/{max} failed: {e}");
                    tokio::time::sleep(self.policy.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(attempt, "failed to retrieve data after {max} attempts: {e}");
                    return Err(failure(target, attempt, e));
                }
            }
        }
    }
}

fn failure(target: &Target, attempts: u32, last_error: FetchError) -> FetchFailure {
    FetchFailure { target: target.clone(), attempts, last_error }
}
