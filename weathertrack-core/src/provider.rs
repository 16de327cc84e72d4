use crate::{
    Config, FetchError, Observation, Target,
    provider::openweather::OpenWeatherProvider,
};
use anyhow::Context;
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openweather;

/// A source of current weather observations.
///
/// One call is one attempt; retrying is the caller's concern.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn current(&self, target: &Target) -> Result<Observation, FetchError>;
}

/// Construct the OpenWeather provider from config.
///
/// Fails when no API key is available or the HTTP client cannot be built.
pub fn provider_from_config(config: &Config) -> anyhow::Result<OpenWeatherProvider> {
    let api_key = config.require_api_key()?;
    let http = OpenWeatherProvider::build_client(config.request_timeout())
        .context("Failed to build HTTP client")?;

    Ok(OpenWeatherProvider::new(api_key.to_owned(), http)
        .with_base_url(config.base_url.clone())
        .with_units(config.units))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_from_config_errors_when_missing_api_key() {
        let cfg = Config::default();
        let err = provider_from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("No API key configured"));
    }

    #[test]
    fn provider_from_config_works_when_key_set() {
        let mut cfg = Config::default();
        cfg.set_api_key("KEY".to_string());

        assert!(provider_from_config(&cfg).is_ok());
    }
}
