//! Weather service integration

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::integrations::check_status;
use crate::{Error, Result};

/// Forecast lookup used by the assistant
pub trait WeatherService: Send + Sync {
    /// Forecast for `place`, today first
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-success status
    fn forecast(&self, place: &str) -> Result<WeatherReport>;
}

/// Forecast response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub place: String,
    #[serde(default)]
    pub forecast: Vec<DayForecast>,
}

/// One day of a forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayForecast {
    /// Weekday name, e.g. `Monday`
    pub day: String,
    /// Condition, e.g. `sunny`
    pub weather: String,
    pub temperature: Temperature,
}

/// Daily temperature range in degrees Celsius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub min: f64,
    pub max: f64,
}

/// Client for the weather REST service
#[derive(Debug, Clone)]
pub struct RestWeatherClient {
    /// HTTP client
    client: Client,
    /// Endpoint URL
    base_url: String,
}

impl RestWeatherClient {
    /// Create a new weather client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client can't be built
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl WeatherService for RestWeatherClient {
    fn forecast(&self, place: &str) -> Result<WeatherReport> {
        tracing::debug!(place, "fetching forecast");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("place", place)])
            .send()?;
        let response = check_status(response)?;

        let report: WeatherReport = serde_json::from_str(&response.text()?)?;
        tracing::debug!(place = %report.place, days = report.forecast.len(), "forecast received");
        Ok(report)
    }
}
