//! Serde-deserializable types matching the public API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use super::types::{DailyPoint, HistoricalSeries, WeatherCondition};

// ============================================================================
// disease.sh historical endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiHistorical {
  #[serde(default)]
  pub country: String,
  pub timeline: ApiTimeline,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiTimeline {
  #[serde(default)]
  pub cases: HashMap<String, u64>,
  #[serde(default)]
  pub deaths: HashMap<String, u64>,
}

impl ApiHistorical {
  /// Convert the date-keyed maps into a date-ordered series.
  ///
  /// Keys use the `M/D/YY` form; keys that don't parse are dropped.
  pub fn into_series(self) -> HistoricalSeries {
    let mut days: BTreeMap<NaiveDate, DailyPoint> = BTreeMap::new();

    for (label, cases) in &self.timeline.cases {
      if let Some(date) = parse_timeline_date(label) {
        days.insert(
          date,
          DailyPoint {
            date: label.clone(),
            cases: *cases,
            deaths: self.timeline.deaths.get(label).copied().unwrap_or(0),
          },
        );
      }
    }

    HistoricalSeries {
      country: self.country,
      points: days.into_values().collect(),
    }
  }
}

fn parse_timeline_date(label: &str) -> Option<NaiveDate> {
  NaiveDate::parse_from_str(label, "%m/%d/%y").ok()
}

// ============================================================================
// wttr.in j1 format
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiWeatherReport {
  #[serde(default)]
  pub current_condition: Vec<ApiCurrentCondition>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCurrentCondition {
  #[serde(rename = "temp_C")]
  pub temp_c: Option<String>,
  pub humidity: Option<String>,
  #[serde(rename = "weatherDesc", default)]
  pub weather_desc: Vec<ApiValue>,
  #[serde(rename = "localObsDateTime")]
  pub local_obs_date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiValue {
  pub value: String,
}

impl ApiWeatherReport {
  /// The first current condition, if the report has one.
  pub fn into_condition(self, city: &str) -> Option<WeatherCondition> {
    let current = self.current_condition.into_iter().next()?;
    Some(WeatherCondition {
      city: city.to_string(),
      temp_c: current.temp_c.as_deref().and_then(|t| t.trim().parse().ok()),
      humidity: current.humidity.as_deref().and_then(|h| h.trim().parse().ok()),
      description: current.weather_desc.into_iter().next().map(|d| d.value),
      observed_at: current.local_obs_date_time,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_historical_is_sorted_by_date() {
    let raw = r#"{
      "country": "India",
      "timeline": {
        "cases": {"12/31/22": 100, "1/2/23": 130, "1/1/23": 110},
        "deaths": {"12/31/22": 1, "1/1/23": 1, "1/2/23": 2}
      }
    }"#;
    let series = serde_json::from_str::<ApiHistorical>(raw)
      .unwrap()
      .into_series();

    let dates: Vec<&str> = series.points.iter().map(|p| p.date.as_str()).collect();
    assert_eq!(dates, vec!["12/31/22", "1/1/23", "1/2/23"]);
    assert_eq!(series.points[2].deaths, 2);
    assert_eq!(series.daily_new_cases(), 20);
  }

  #[test]
  fn test_historical_drops_bad_dates() {
    let raw = r#"{"country":"India","timeline":{"cases":{"yesterday":5,"1/1/23":1}}}"#;
    let series = serde_json::from_str::<ApiHistorical>(raw)
      .unwrap()
      .into_series();
    assert_eq!(series.points.len(), 1);
    assert_eq!(series.points[0].deaths, 0);
  }

  #[test]
  fn test_weather_condition() {
    let raw = r#"{"current_condition":[{"temp_C":"31","humidity":"74","weatherDesc":[{"value":"Haze"}],"localObsDateTime":"2024-01-05 10:12 AM"}]}"#;
    let condition = serde_json::from_str::<ApiWeatherReport>(raw)
      .unwrap()
      .into_condition("Mumbai")
      .unwrap();
    assert_eq!(condition.city, "Mumbai");
    assert_eq!(condition.temp_c, Some(31.0));
    assert_eq!(condition.humidity, Some(74.0));
    assert_eq!(condition.description.as_deref(), Some("Haze"));
  }

  #[test]
  fn test_weather_without_condition() {
    let report = serde_json::from_str::<ApiWeatherReport>("{}").unwrap();
    assert!(report.into_condition("Mumbai").is_none());
  }
}
