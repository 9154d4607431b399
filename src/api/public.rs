//! Clients for the unauthenticated public data sources.

use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use url::Url;

use crate::cache::FetchError;
use crate::config::PublicConfig;

use super::api_types::{ApiHistorical, ApiWeatherReport};
use super::client::{endpoint, read_json};
use super::types::{CountryStats, HistoricalSeries, WeatherCondition};

/// disease.sh and wttr.in client
#[derive(Clone)]
pub struct PublicClient {
  http: reqwest::Client,
  disease_url: Url,
  weather_url: Url,
}

impl PublicClient {
  pub fn new(config: &PublicConfig, timeout: Duration) -> Result<Self> {
    let disease_url = Url::parse(&config.disease_url)
      .map_err(|e| eyre!("Invalid disease.sh url '{}': {}", config.disease_url, e))?;
    let weather_url = Url::parse(&config.weather_url)
      .map_err(|e| eyre!("Invalid weather url '{}': {}", config.weather_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("flu-radar/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      disease_url,
      weather_url,
    })
  }

  /// Current totals for a country
  pub async fn get_country_stats(&self, country: &str) -> Result<CountryStats, FetchError> {
    let url = with_segment(endpoint(&self.disease_url, "countries/")?, country)?;
    tracing::debug!(%url, "GET");
    let response = self.http.get(url).send().await?;
    read_json(response).await
  }

  /// Cumulative cases and deaths for the last `days` days, oldest first
  pub async fn get_historical(
    &self,
    country: &str,
    days: u32,
  ) -> Result<HistoricalSeries, FetchError> {
    let mut url = with_segment(endpoint(&self.disease_url, "historical/")?, country)?;
    url
      .query_pairs_mut()
      .append_pair("lastdays", &days.to_string());
    tracing::debug!(%url, "GET");
    let response = self.http.get(url).send().await?;
    let historical: ApiHistorical = read_json(response).await?;
    Ok(historical.into_series())
  }

  /// Current weather for a city
  pub async fn get_weather(&self, city: &str) -> Result<WeatherCondition, FetchError> {
    let mut url = with_segment(endpoint(&self.weather_url, "")?, city)?;
    url.query_pairs_mut().append_pair("format", "j1");
    tracing::debug!(%url, "GET");
    let response = self.http.get(url).send().await?;
    let report: ApiWeatherReport = read_json(response).await?;
    report
      .into_condition(city)
      .ok_or_else(|| FetchError::Decode(format!("No current condition for {}", city)))
  }
}

fn with_segment(mut url: Url, segment: &str) -> Result<Url, FetchError> {
  url
    .path_segments_mut()
    .map_err(|_| FetchError::Transport("Cannot append path to base url".to_string()))?
    .pop_if_empty()
    .push(segment);
  Ok(url)
}
