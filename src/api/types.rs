use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Alert level assigned by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Red,
  Orange,
  Yellow,
  Green,
  Normal,
  #[serde(other)]
  Unknown,
}

impl Severity {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Red => "red",
      Self::Orange => "orange",
      Self::Yellow => "yellow",
      Self::Green => "green",
      Self::Normal => "normal",
      Self::Unknown => "unknown",
    }
  }

  /// Whether this level should be surfaced as an outbreak alert.
  pub fn is_alert(&self) -> bool {
    matches!(self, Self::Red | Self::Orange)
  }
}

/// Dashboard headline numbers (`GET /api/stats`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardStats {
  pub total_transactions_24h: u64,
  pub total_anomalies: u64,
  pub critical_alerts: u64,
  pub warnings: u64,
  pub monitoring: u64,
  pub pincodes_monitored: u64,
  pub active_outbreaks: u64,
  pub system_status: Option<String>,
  /// Stamped by the server on every response
  pub last_updated: Option<String>,
}

impl DashboardStats {
  /// Equality ignoring the server-side `last_updated` stamp.
  pub fn same_figures(&self, other: &Self) -> bool {
    self.total_transactions_24h == other.total_transactions_24h
      && self.total_anomalies == other.total_anomalies
      && self.critical_alerts == other.critical_alerts
      && self.warnings == other.warnings
      && self.monitoring == other.monitoring
      && self.pincodes_monitored == other.pincodes_monitored
      && self.active_outbreaks == other.active_outbreaks
      && self.system_status == other.system_status
  }
}

/// One day of purchases for a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
  pub date: String,
  pub category: String,
  pub quantity: f64,
}

/// Purchase trend series (`GET /api/trends`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendData {
  pub data: Vec<TrendPoint>,
  pub start_date: Option<String>,
  pub end_date: Option<String>,
}

impl TrendData {
  pub fn total_quantity(&self) -> f64 {
    self.data.iter().map(|p| p.quantity).sum()
  }
}

/// Region with anomalous purchasing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapAlert {
  pub pincode: String,
  #[serde(default)]
  pub anomaly_count: u64,
  #[serde(default)]
  pub total_transactions: u64,
  pub severity: Severity,
}

/// Active regional alerts (`GET /api/heatmap`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapData {
  pub alerts: Vec<HeatmapAlert>,
  /// Stamped by the server on every response
  pub timestamp: Option<String>,
}

impl HeatmapData {
  /// Equality ignoring the server-side `timestamp`.
  pub fn same_alerts(&self, other: &Self) -> bool {
    self.alerts == other.alerts
  }

  pub fn count_at(&self, severity: Severity) -> usize {
    self.alerts.iter().filter(|a| a.severity == severity).count()
  }
}

/// Classification of one region (`GET /api/outbreak-status/{pincode}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutbreakStatus {
  pub pincode: String,
  pub severity: Severity,
  #[serde(default)]
  pub confidence: f64,
  #[serde(default)]
  pub affected_count: u64,
  #[serde(default)]
  pub detected_at: Option<String>,
}

impl OutbreakStatus {
  /// Equality ignoring `detected_at`, which the backend sets to "now".
  pub fn same_assessment(&self, other: &Self) -> bool {
    self.pincode == other.pincode
      && self.severity == other.severity
      && self.confidence == other.confidence
      && self.affected_count == other.affected_count
  }
}

/// A pharmacy sale submitted for anomaly scoring (`POST /api/transactions`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
  pub timestamp: DateTime<Utc>,
  pub pincode: String,
  pub medicine_name: String,
  pub category: String,
  pub quantity: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub customer_age: Option<u32>,
}

/// Backend verdict on a submitted transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
  pub is_anomaly: bool,
  pub transaction_id: Option<String>,
  pub severity: Option<Severity>,
  pub status: Option<String>,
  // Catch-all for fields added by newer backends
  #[serde(flatten)]
  pub extra: HashMap<String, serde_json::Value>,
}

/// Response of the backend root endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
  pub status: String,
  #[serde(default)]
  pub service: Option<String>,
  #[serde(default)]
  pub version: Option<String>,
  #[serde(default)]
  pub models_loaded: bool,
}

/// Country-level totals from disease.sh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CountryStats {
  pub country: String,
  pub cases: u64,
  pub today_cases: u64,
  pub deaths: u64,
  pub today_deaths: u64,
  pub recovered: u64,
  pub active: u64,
  pub critical: u64,
  pub tests: u64,
  /// Milliseconds since epoch of the upstream refresh
  pub updated: u64,
}

/// One day of a cumulative historical series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
  pub date: String,
  pub cases: u64,
  pub deaths: u64,
}

/// Date-ordered cumulative series for a country
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
  pub country: String,
  pub points: Vec<DailyPoint>,
}

impl HistoricalSeries {
  /// New cases on the most recent day; zero if the series is too short or
  /// the cumulative count went down.
  pub fn daily_new_cases(&self) -> u64 {
    match self.points.as_slice() {
      [.., previous, latest] => latest.cases.saturating_sub(previous.cases),
      _ => 0,
    }
  }

  /// The last `n` points.
  pub fn last_days(&self, n: usize) -> &[DailyPoint] {
    let start = self.points.len().saturating_sub(n);
    &self.points[start..]
  }
}

/// Current weather from wttr.in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherCondition {
  pub city: String,
  pub temp_c: Option<f64>,
  pub humidity: Option<f64>,
  pub description: Option<String>,
  pub observed_at: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn point(date: &str, cases: u64) -> DailyPoint {
    DailyPoint {
      date: date.to_string(),
      cases,
      deaths: 0,
    }
  }

  #[test]
  fn test_daily_new_cases() {
    let series = HistoricalSeries {
      country: "India".to_string(),
      points: vec![point("1/1/23", 100), point("1/2/23", 130)],
    };
    assert_eq!(series.daily_new_cases(), 30);
  }

  #[test]
  fn test_daily_new_cases_short_or_decreasing() {
    let mut series = HistoricalSeries::default();
    assert_eq!(series.daily_new_cases(), 0);

    series.points = vec![point("1/1/23", 100), point("1/2/23", 90)];
    assert_eq!(series.daily_new_cases(), 0);
  }

  #[test]
  fn test_last_days() {
    let series = HistoricalSeries {
      country: "India".to_string(),
      points: (1..=9).map(|d| point(&format!("1/{}/23", d), d)).collect(),
    };
    let last = series.last_days(7);
    assert_eq!(last.len(), 7);
    assert_eq!(last[0].date, "1/3/23");
    assert_eq!(series.last_days(20).len(), 9);
  }

  #[test]
  fn test_stats_equality_ignores_stamp() {
    let a = DashboardStats {
      total_anomalies: 62,
      last_updated: Some("2024-01-01T00:00:00".to_string()),
      ..Default::default()
    };
    let b = DashboardStats {
      last_updated: Some("2024-01-01T00:00:30".to_string()),
      ..a.clone()
    };
    assert!(a.same_figures(&b));
    assert_ne!(a, b);

    let c = DashboardStats {
      total_anomalies: 63,
      ..a.clone()
    };
    assert!(!a.same_figures(&c));
  }

  #[test]
  fn test_unknown_severity() {
    let severity: Severity = serde_json::from_str("\"purple\"").unwrap();
    assert_eq!(severity, Severity::Unknown);
    let severity: Severity = serde_json::from_str("\"orange\"").unwrap();
    assert!(severity.is_alert());
  }

  #[test]
  fn test_transaction_result_keeps_extra_fields() {
    let result: TransactionResult = serde_json::from_str(
      r#"{"status":"received","transaction_id":"txn_400001_1","is_anomaly":true,"severity":"red","score":0.9}"#,
    )
    .unwrap();
    assert!(result.is_anomaly);
    assert_eq!(result.severity, Some(Severity::Red));
    assert!(result.extra.contains_key("score"));
  }

  #[test]
  fn test_transaction_omits_missing_age() {
    let txn = Transaction {
      timestamp: Utc::now(),
      pincode: "400001".to_string(),
      medicine_name: "Dolo 650".to_string(),
      category: "FEVER".to_string(),
      quantity: 2,
      customer_age: None,
    };
    let json = serde_json::to_value(&txn).unwrap();
    assert!(json.get("customer_age").is_none());
    assert_eq!(json["quantity"], 2);
  }
}
