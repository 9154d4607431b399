//! Resource keys and factories binding each endpoint to the polling cache.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Resource, SnapshotStore};
use crate::config::Config;

use super::client::BackendClient;
use super::public::PublicClient;
use super::types::{
  CountryStats, DashboardStats, HeatmapData, HistoricalSeries, OutbreakStatus, TrendData,
  WeatherCondition,
};

/// Identity of every resource the dashboard polls.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKey {
  /// Dashboard headline numbers
  Stats,
  /// Purchase trends, optionally for one pincode
  Trends { pincode: Option<String>, days: u32 },
  /// Active regional alerts
  Heatmap,
  /// Classification of one pincode
  OutbreakStatus { pincode: String },
  /// disease.sh country totals
  CountryStats { country: String },
  /// disease.sh cumulative series
  Historical { country: String, days: u32 },
  /// wttr.in current conditions
  Weather { city: String },
}

impl ResourceKey {
  /// Cache identity: endpoint plus normalized parameters.
  pub fn cache_key(&self) -> String {
    match self {
      Self::Stats => "backend:/api/stats".to_string(),
      Self::Trends { pincode, days } => format!(
        "backend:/api/trends?pincode={}&days={}",
        pincode.as_deref().map(normalize).unwrap_or_default(),
        days
      ),
      Self::Heatmap => "backend:/api/heatmap".to_string(),
      Self::OutbreakStatus { pincode } => {
        format!("backend:/api/outbreak-status/{}", normalize(pincode))
      }
      Self::CountryStats { country } => format!("disease:/countries/{}", normalize(country)),
      Self::Historical { country, days } => {
        format!("disease:/historical/{}?lastdays={}", normalize(country), days)
      }
      Self::Weather { city } => format!("weather:/{}", normalize(city)),
    }
  }

  pub fn description(&self) -> String {
    match self {
      Self::Stats => "dashboard stats".to_string(),
      Self::Trends { pincode, days } => match pincode {
        Some(p) => format!("{}-day trends for {}", days, p),
        None => format!("{}-day trends", days),
      },
      Self::Heatmap => "outbreak heatmap".to_string(),
      Self::OutbreakStatus { pincode } => format!("outbreak status for {}", pincode),
      Self::CountryStats { country } => format!("{} totals", country),
      Self::Historical { country, days } => format!("{} {}-day history", country, days),
      Self::Weather { city } => format!("weather in {}", city),
    }
  }
}

/// Trims whitespace and lowercases for case-insensitive matching.
fn normalize(param: &str) -> String {
  param.trim().to_lowercase()
}

/// Builds typed resources from the injected clients and polling config.
///
/// Parameters are normalized once, and the same string feeds both the cache
/// key and the request, so every subscriber of a key sees the same fetch.
#[derive(Clone)]
pub struct Catalogue {
  backend: BackendClient,
  public: PublicClient,
  dashboard_interval: Duration,
  public_interval: Duration,
  fetch_timeout: Duration,
  store: Option<Arc<dyn SnapshotStore>>,
}

impl Catalogue {
  pub fn new(config: &Config, backend: BackendClient, public: PublicClient) -> Self {
    Self {
      backend,
      public,
      dashboard_interval: Duration::from_secs(config.polling.dashboard_secs),
      public_interval: Duration::from_secs(config.polling.public_secs),
      fetch_timeout: Duration::from_secs(config.backend.timeout_secs),
      store: None,
    }
  }

  /// Persist every resource built from now on in `store`.
  pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
    self.store = Some(store);
    self
  }

  pub fn backend(&self) -> &BackendClient {
    &self.backend
  }

  pub fn stats(&self) -> Resource<DashboardStats> {
    let client = self.backend.clone();
    let resource = Resource::new(ResourceKey::Stats.cache_key(), self.dashboard_interval, move || {
      let client = client.clone();
      async move { client.get_stats().await }
    })
    .with_equality(DashboardStats::same_figures);
    self.finish(resource, &ResourceKey::Stats)
  }

  pub fn trends(&self, pincode: Option<&str>, days: u32) -> Resource<TrendData> {
    let pincode = pincode.map(normalize);
    let key = ResourceKey::Trends {
      pincode: pincode.clone(),
      days,
    };
    let client = self.backend.clone();
    let resource = Resource::new(key.cache_key(), self.dashboard_interval, move || {
      let client = client.clone();
      let pincode = pincode.clone();
      async move { client.get_trends(pincode.as_deref(), days).await }
    });
    self.finish(resource, &key)
  }

  pub fn heatmap(&self) -> Resource<HeatmapData> {
    let client = self.backend.clone();
    let resource = Resource::new(
      ResourceKey::Heatmap.cache_key(),
      self.dashboard_interval,
      move || {
        let client = client.clone();
        async move { client.get_heatmap().await }
      },
    )
    .with_equality(HeatmapData::same_alerts);
    self.finish(resource, &ResourceKey::Heatmap)
  }

  pub fn outbreak_status(&self, pincode: &str) -> Resource<OutbreakStatus> {
    let pincode = normalize(pincode);
    let key = ResourceKey::OutbreakStatus {
      pincode: pincode.clone(),
    };
    let client = self.backend.clone();
    let resource = Resource::new(key.cache_key(), self.dashboard_interval, move || {
      let client = client.clone();
      let pincode = pincode.clone();
      async move { client.get_outbreak_status(&pincode).await }
    })
    .with_equality(OutbreakStatus::same_assessment);
    self.finish(resource, &key)
  }

  pub fn country_stats(&self, country: &str) -> Resource<CountryStats> {
    let country = normalize(country);
    let key = ResourceKey::CountryStats {
      country: country.clone(),
    };
    let client = self.public.clone();
    let resource = Resource::new(key.cache_key(), self.public_interval, move || {
      let client = client.clone();
      let country = country.clone();
      async move { client.get_country_stats(&country).await }
    });
    self.finish(resource, &key)
  }

  pub fn historical(&self, country: &str, days: u32) -> Resource<HistoricalSeries> {
    let country = normalize(country);
    let key = ResourceKey::Historical {
      country: country.clone(),
      days,
    };
    let client = self.public.clone();
    let resource = Resource::new(key.cache_key(), self.public_interval, move || {
      let client = client.clone();
      let country = country.clone();
      async move { client.get_historical(&country, days).await }
    });
    self.finish(resource, &key)
  }

  pub fn weather(&self, city: &str) -> Resource<WeatherCondition> {
    let city = normalize(city);
    let key = ResourceKey::Weather { city: city.clone() };
    let client = self.public.clone();
    let resource = Resource::new(key.cache_key(), self.public_interval, move || {
      let client = client.clone();
      let city = city.clone();
      async move { client.get_weather(&city).await }
    });
    self.finish(resource, &key)
  }

  fn finish<T>(&self, resource: Resource<T>, key: &ResourceKey) -> Resource<T>
  where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
  {
    let resource = resource
      .with_timeout(self.fetch_timeout)
      .with_description(key.description());
    match &self.store {
      Some(store) => resource.persisted(Arc::clone(store)),
      None => resource,
    }
  }
}
