use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::api::types::{
  CountryStats, DashboardStats, HeatmapData, HistoricalSeries, OutbreakStatus, Severity,
  Transaction, TrendData, WeatherCondition,
};
use crate::api::{BackendClient, Catalogue, PublicClient};
use crate::cache::{PollingCache, SnapshotStore};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::feed;
use crate::panels::PanelKind;

/// Window the trends panel asks the backend for
const TREND_DAYS: u32 = 7;

/// Command runner shared by every subcommand
pub struct App {
  /// Application configuration
  config: Config,

  /// Resource factory over the backend and public clients
  catalogue: Catalogue,

  /// Shared polling cache for `watch`
  cache: PollingCache,
}

impl App {
  pub fn new(config: Config, store: Option<Arc<dyn SnapshotStore>>) -> Result<Self> {
    let backend = BackendClient::new(&config.backend)?;
    let public = PublicClient::new(
      &config.public,
      Duration::from_secs(config.backend.timeout_secs),
    )?;

    let catalogue = Catalogue::new(&config, backend, public);
    let catalogue = match store {
      Some(store) => catalogue.with_store(store),
      None => catalogue,
    };

    Ok(Self {
      config,
      catalogue,
      cache: PollingCache::new(),
    })
  }

  fn backend(&self) -> &BackendClient {
    self.catalogue.backend()
  }

  /// Subscribe to the selected panels and print every change until Ctrl-C.
  pub async fn watch(&self, pincode: Option<&str>, panels: &[PanelKind]) -> Result<()> {
    let mut events = EventHandler::new();
    events.listen_for_shutdown();

    let public = &self.config.public;
    for panel in panels {
      match panel {
        PanelKind::Stats => events.watch(self.cache.subscribe(&self.catalogue.stats())?, summarize_stats),
        PanelKind::Trends => events.watch(
          self.cache.subscribe(&self.catalogue.trends(pincode, TREND_DAYS))?,
          summarize_trends,
        ),
        PanelKind::Heatmap => {
          events.watch(self.cache.subscribe(&self.catalogue.heatmap())?, summarize_heatmap)
        }
        PanelKind::Status => match pincode {
          Some(pincode) => events.watch(
            self.cache.subscribe(&self.catalogue.outbreak_status(pincode))?,
            summarize_status,
          ),
          None => tracing::warn!("Skipping status panel: no --pincode given"),
        },
        PanelKind::Country => events.watch(
          self.cache.subscribe(&self.catalogue.country_stats(&public.country))?,
          summarize_country,
        ),
        PanelKind::History => events.watch(
          self
            .cache
            .subscribe(&self.catalogue.historical(&public.country, public.history_days))?,
          summarize_history,
        ),
        PanelKind::Weather => events.watch(
          self.cache.subscribe(&self.catalogue.weather(&public.city))?,
          summarize_weather,
        ),
      }
    }

    if self.cache.is_empty() {
      return Err(eyre!("Nothing to watch"));
    }
    tracing::info!(resources = self.cache.len(), "Watching; press Ctrl-C to stop");

    while let Some(event) = events.next().await {
      match event {
        Event::Update(update) => println!("{}", update),
        Event::Shutdown => break,
      }
    }

    // Dropping the handler drops every subscription and stops the pollers.
    drop(events);
    Ok(())
  }

  /// Fetch and print the outbreak status of one pincode.
  pub async fn status(&self, pincode: &str) -> Result<()> {
    let status = self
      .backend()
      .get_outbreak_status(pincode)
      .await
      .map_err(|e| eyre!("Failed to fetch outbreak status for {}: {}", pincode, e))?;
    println!("{}", summarize_status(&status));
    Ok(())
  }

  /// Submit one transaction and print the verdict.
  pub async fn submit(&self, transaction: Transaction) -> Result<()> {
    let result = self
      .backend()
      .submit_transaction(&transaction)
      .await
      .map_err(|e| eyre!("Failed to submit transaction: {}", e))?;
    let activity = feed::Activity::new(&transaction, &result);
    println!("{}", activity);
    if let Some(id) = &result.transaction_id {
      println!("transaction id: {}", id);
    }
    Ok(())
  }

  /// Run the simulated activity feed.
  pub async fn feed(&self, count: Option<usize>) -> Result<()> {
    let backend = self.backend().clone();
    let period = Duration::from_secs(self.config.polling.feed_secs);

    let run = feed::run(
      period,
      count,
      |txn| {
        let backend = backend.clone();
        async move { backend.submit_transaction(&txn).await }
      },
      |feed| {
        if let Some(latest) = feed.latest() {
          println!("{}", latest);
        }
      },
    );

    tokio::select! {
      feed = run => {
        println!(
          "{} transactions, {} flagged as anomalies",
          feed.len(),
          feed.anomalies()
        );
      }
      _ = tokio::signal::ctrl_c() => {
        tracing::info!("Feed stopped");
      }
    }
    Ok(())
  }

  /// Check the backend root endpoint.
  pub async fn health(&self) -> Result<()> {
    let health = self
      .backend()
      .health_check()
      .await
      .map_err(|e| eyre!("Backend at {} is unreachable: {}", self.backend().base_url(), e))?;
    let service = health.service.as_deref().unwrap_or("backend");
    let version = health.version.as_deref().unwrap_or("unknown");
    println!(
      "{} {} is {} (models loaded: {})",
      service, version, health.status, health.models_loaded
    );
    Ok(())
  }
}

fn summarize_stats(stats: &DashboardStats) -> String {
  format!(
    "{} transactions/24h, {} anomalies, {} critical, {} warnings, {} pincodes",
    stats.total_transactions_24h,
    stats.total_anomalies,
    stats.critical_alerts,
    stats.warnings,
    stats.pincodes_monitored
  )
}

fn summarize_trends(trends: &TrendData) -> String {
  let mut categories: Vec<&str> = trends.data.iter().map(|p| p.category.as_str()).collect();
  categories.sort_unstable();
  categories.dedup();
  format!(
    "{} points, {} units across {}",
    trends.data.len(),
    trends.total_quantity(),
    if categories.is_empty() {
      "no categories".to_string()
    } else {
      categories.join("/")
    }
  )
}

fn summarize_heatmap(heatmap: &HeatmapData) -> String {
  format!(
    "{} alerts ({} red, {} orange, {} yellow)",
    heatmap.alerts.len(),
    heatmap.count_at(Severity::Red),
    heatmap.count_at(Severity::Orange),
    heatmap.count_at(Severity::Yellow)
  )
}

fn summarize_status(status: &OutbreakStatus) -> String {
  format!(
    "{}: {} (confidence {:.0}%, {} affected)",
    status.pincode,
    status.severity.as_str(),
    status.confidence * 100.0,
    status.affected_count
  )
}

fn summarize_country(stats: &CountryStats) -> String {
  format!(
    "{}: {} active, {} new today, {} deaths",
    stats.country, stats.active, stats.today_cases, stats.deaths
  )
}

fn summarize_history(series: &HistoricalSeries) -> String {
  match series.points.last() {
    Some(latest) => format!(
      "{}: {} cumulative cases as of {} (+{})",
      series.country,
      latest.cases,
      latest.date,
      series.daily_new_cases()
    ),
    None => format!("{}: no history", series.country),
  }
}

fn summarize_weather(weather: &WeatherCondition) -> String {
  let temp = weather
    .temp_c
    .map_or_else(|| "?".to_string(), |t| format!("{:.0}°C", t));
  let humidity = weather
    .humidity
    .map_or_else(|| "?".to_string(), |h| format!("{:.0}%", h));
  format!(
    "{}: {}, humidity {}, {}",
    weather.city,
    temp,
    humidity,
    weather.description.as_deref().unwrap_or("no description")
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::{DailyPoint, HeatmapAlert, TrendPoint};

  #[test]
  fn test_summarize_heatmap_counts_levels() {
    let alert = |pincode: &str, severity| HeatmapAlert {
      pincode: pincode.to_string(),
      anomaly_count: 3,
      total_transactions: 40,
      severity,
    };
    let heatmap = HeatmapData {
      alerts: vec![
        alert("400001", Severity::Red),
        alert("400005", Severity::Orange),
        alert("400012", Severity::Red),
      ],
      timestamp: None,
    };
    assert_eq!(summarize_heatmap(&heatmap), "3 alerts (2 red, 1 orange, 0 yellow)");
  }

  #[test]
  fn test_summarize_trends_dedups_categories() {
    let point = |category: &str, quantity| TrendPoint {
      date: "2024-01-01".to_string(),
      category: category.to_string(),
      quantity,
    };
    let trends = TrendData {
      data: vec![point("Fever", 10.0), point("Cough", 5.0), point("Fever", 2.0)],
      start_date: None,
      end_date: None,
    };
    assert_eq!(summarize_trends(&trends), "3 points, 17 units across Cough/Fever");
  }

  #[test]
  fn test_summarize_history() {
    let series = HistoricalSeries {
      country: "India".to_string(),
      points: vec![
        DailyPoint {
          date: "2023-01-01".to_string(),
          cases: 100,
          deaths: 1,
        },
        DailyPoint {
          date: "2023-01-02".to_string(),
          cases: 130,
          deaths: 1,
        },
      ],
    };
    assert_eq!(
      summarize_history(&series),
      "India: 130 cumulative cases as of 2023-01-02 (+30)"
    );
    assert_eq!(
      summarize_history(&HistoricalSeries::default()),
      ": no history"
    );
  }

  #[test]
  fn test_summarize_weather_missing_fields() {
    let weather = WeatherCondition {
      city: "Mumbai".to_string(),
      ..WeatherCondition::default()
    };
    assert_eq!(
      summarize_weather(&weather),
      "Mumbai: ?, humidity ?, no description"
    );
  }

  #[tokio::test]
  async fn test_watch_without_panels_is_error() {
    let app = App::new(Config::default(), None).unwrap();
    assert!(app.watch(None, &[PanelKind::Status]).await.is_err());
  }
}
