use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use reqwest::Client;
use serde::Deserialize;
use tracing::trace;

use crate::{
    error::FetchError,
    model::{Observation, Target, Units},
};

use super::WeatherProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

const MPS_TO_MPH: f64 = 2.23694;

/// Client for the OpenWeather "current weather" endpoint.
///
/// Clones share the underlying connection pool of `http`.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    units: Units,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String, http: Client) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            units: Units::default(),
            http,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    /// Build the shared HTTP client; `timeout` bounds each attempt.
    pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
        Client::builder().timeout(timeout).build()
    }

    fn endpoint(&self) -> String {
        format!("{}/data/2.5/weather", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn current(&self, target: &Target) -> Result<Observation, FetchError> {
        let query = format!("{},{}", target.location, target.region);

        let res = self
            .http
            .get(self.endpoint())
            .query(&[
                ("q", query.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", self.units.as_str()),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status { status, body: truncate_body(&body) });
        }

        trace!(%target, "received {} bytes", body.len());

        let parsed: OwCurrentResponse = serde_json::from_str(&body)?;
        normalize(parsed, target, self.units)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
}

fn normalize(parsed: OwCurrentResponse, target: &Target, units: Units) -> Result<Observation, FetchError> {
    let description = parsed
        .weather
        .into_iter()
        .next()
        .map(|w| w.description)
        .ok_or_else(|| FetchError::InvalidPayload("empty weather array".to_string()))?;

    let observed_at = DateTime::from_timestamp(parsed.dt, 0)
        .ok_or_else(|| FetchError::InvalidPayload(format!("observation time {} out of range", parsed.dt)))?
        .with_timezone(&Local)
        .fixed_offset();

    let (temperature_f, wind_mph) = match units {
        Units::Imperial => (parsed.main.temp, parsed.wind.speed),
        Units::Metric => (
            round_to(parsed.main.temp * 9.0 / 5.0 + 32.0, 2),
            parsed.wind.speed * MPS_TO_MPH,
        ),
    };

    Ok(Observation {
        location: parsed.name,
        region: target.region.clone(),
        description,
        temperature_f,
        humidity_pct: parsed.main.humidity,
        wind_speed_mph: round_to(wind_mph, 1),
        observed_at,
    })
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn denver() -> Target {
        Target::new("Colorado", "Denver")
    }

    fn body(dt: i64) -> serde_json::Value {
        json!({
            "name": "Denver",
            "dt": dt,
            "main": { "temp": 71.6, "humidity": 23 },
            "weather": [{ "description": "clear sky" }],
            "wind": { "speed": 9.22 }
        })
    }

    fn provider(server: &MockServer) -> OpenWeatherProvider {
        let http = OpenWeatherProvider::build_client(Duration::from_secs(2)).unwrap();
        OpenWeatherProvider::new("KEY".to_string(), http).with_base_url(server.uri())
    }

    #[tokio::test]
    async fn current_sends_location_key_and_units() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "Denver,Colorado"))
            .and(query_param("appid", "KEY"))
            .and(query_param("units", "imperial"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(1_700_000_000)))
            .expect(1)
            .mount(&server)
            .await;

        let obs = provider(&server).current(&denver()).await.unwrap();

        assert_eq!(obs.location, "Denver");
        assert_eq!(obs.region, "Colorado");
        assert_eq!(obs.description, "clear sky");
        assert_eq!(obs.temperature_f, 71.6);
        assert_eq!(obs.humidity_pct, 23.0);
        assert_eq!(obs.wind_speed_mph, 9.2);
        assert_eq!(obs.observed_at.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let err = provider(&server).current(&denver()).await.unwrap_err();
        match err {
            FetchError::Status { status, body } => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_field_is_a_decode_error() {
        let server = MockServer::start().await;
        let mut payload = body(1_700_000_000);
        payload.as_object_mut().unwrap().remove("wind");
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload))
            .mount(&server)
            .await;

        let err = provider(&server).current(&denver()).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn empty_weather_array_is_invalid() {
        let server = MockServer::start().await;
        let mut payload = body(1_700_000_000);
        payload["weather"] = json!([]);
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload))
            .mount(&server)
            .await;

        let err = provider(&server).current(&denver()).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidPayload(_)), "got {err:?}");
    }

    #[test]
    fn metric_readings_are_converted() {
        let parsed = OwCurrentResponse {
            name: "Denver".to_string(),
            dt: 1_700_000_000,
            main: OwMain { temp: 20.0, humidity: 40.0 },
            weather: vec![OwWeather { description: "haze".to_string() }],
            wind: OwWind { speed: 4.0 },
        };

        let obs = normalize(parsed, &denver(), Units::Metric).unwrap();
        assert_eq!(obs.temperature_f, 68.0);
        assert_eq!(obs.wind_speed_mph, 8.9);
        assert_eq!(obs.humidity_pct, 40.0);
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "é".repeat(150);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 203);
    }
}
