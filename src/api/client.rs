use color_eyre::{eyre::eyre, Result};
use reqwest::Response;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::cache::FetchError;
use crate::config::BackendConfig;

use super::types::{
  DashboardStats, HealthStatus, HeatmapData, OutbreakStatus, Transaction, TransactionResult,
  TrendData,
};

/// Outbreak backend API client
#[derive(Clone)]
pub struct BackendClient {
  http: reqwest::Client,
  base_url: Url,
}

impl BackendClient {
  pub fn new(config: &BackendConfig) -> Result<Self> {
    let base_url = Url::parse(&config.url)
      .map_err(|e| eyre!("Invalid backend url '{}': {}", config.url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(concat!("flu-radar/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Check that the backend is up
  pub async fn health_check(&self) -> Result<HealthStatus, FetchError> {
    let url = endpoint(&self.base_url, "")?;
    self.get_json(url).await
  }

  /// Get dashboard headline numbers
  pub async fn get_stats(&self) -> Result<DashboardStats, FetchError> {
    let url = endpoint(&self.base_url, "api/stats")?;
    self.get_json(url).await
  }

  /// Get purchase trends, optionally for one pincode
  pub async fn get_trends(&self, pincode: Option<&str>, days: u32) -> Result<TrendData, FetchError> {
    let mut url = endpoint(&self.base_url, "api/trends")?;
    {
      let mut query = url.query_pairs_mut();
      if let Some(pincode) = pincode {
        query.append_pair("pincode", pincode);
      }
      query.append_pair("days", &days.to_string());
    }
    self.get_json(url).await
  }

  /// Get active regional alerts
  pub async fn get_heatmap(&self) -> Result<HeatmapData, FetchError> {
    let url = endpoint(&self.base_url, "api/heatmap")?;
    self.get_json(url).await
  }

  /// Get the outbreak classification for one pincode
  pub async fn get_outbreak_status(&self, pincode: &str) -> Result<OutbreakStatus, FetchError> {
    let mut url = endpoint(&self.base_url, "api/outbreak-status/")?;
    url
      .path_segments_mut()
      .map_err(|_| FetchError::Transport(format!("Cannot append path to {}", self.base_url)))?
      .pop_if_empty()
      .push(pincode);
    self.get_json(url).await
  }

  /// Submit a transaction for anomaly scoring
  pub async fn submit_transaction(
    &self,
    transaction: &Transaction,
  ) -> Result<TransactionResult, FetchError> {
    let url = endpoint(&self.base_url, "api/transactions")?;
    tracing::debug!(%url, pincode = %transaction.pincode, "POST transaction");
    let response = self.http.post(url).json(transaction).send().await?;
    read_json(response).await
  }

  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
    tracing::debug!(%url, "GET");
    let response = self.http.get(url).send().await?;
    read_json(response).await
  }
}

/// Resolve `path` under `base`, keeping any path prefix the base carries.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, FetchError> {
  let mut base = base.clone();
  if !base.path().ends_with('/') {
    let with_slash = format!("{}/", base.path());
    base.set_path(&with_slash);
  }
  base
    .join(path.trim_start_matches('/'))
    .map_err(|e| FetchError::Transport(format!("Invalid url for '{}': {}", path, e)))
}

/// Decode a JSON body, mapping non-success statuses to application errors.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, FetchError> {
  let status = response.status();
  let body = response.bytes().await?;

  if !status.is_success() {
    return Err(FetchError::Application {
      status: status.as_u16(),
      message: error_message(&body),
    });
  }

  serde_json::from_slice(&body).map_err(FetchError::from)
}

/// Pull `detail` out of FastAPI-style error bodies, else use the raw text.
fn error_message(body: &[u8]) -> String {
  #[derive(serde::Deserialize)]
  struct Detail {
    detail: serde_json::Value,
  }

  match serde_json::from_slice::<Detail>(body) {
    Ok(Detail {
      detail: serde_json::Value::String(detail),
    }) => detail,
    Ok(Detail { detail }) => detail.to_string(),
    Err(_) => String::from_utf8_lossy(body).trim().to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::test_server::serve_once;
  use crate::api::types::Severity;
  use crate::cache::ErrorKind;

  fn client(url: &Url) -> BackendClient {
    BackendClient::new(&BackendConfig {
      url: url.to_string(),
      timeout_secs: 5,
    })
    .unwrap()
  }

  #[test]
  fn test_endpoint_keeps_prefix() {
    let base = Url::parse("http://example.com/radar").unwrap();
    let url = endpoint(&base, "api/stats").unwrap();
    assert_eq!(url.as_str(), "http://example.com/radar/api/stats");

    let base = Url::parse("http://localhost:8000").unwrap();
    let url = endpoint(&base, "/api/heatmap").unwrap();
    assert_eq!(url.as_str(), "http://localhost:8000/api/heatmap");
  }

  #[test]
  fn test_error_message_prefers_detail() {
    assert_eq!(error_message(br#"{"detail":"model not loaded"}"#), "model not loaded");
    assert_eq!(error_message(b"Bad Gateway\n"), "Bad Gateway");
  }

  #[test]
  fn test_rejects_invalid_url() {
    let config = BackendConfig {
      url: "not a url".to_string(),
      timeout_secs: 5,
    };
    assert!(BackendClient::new(&config).is_err());
  }

  #[tokio::test]
  async fn test_get_stats() {
    let server = serve_once(
      "200 OK",
      r#"{"total_transactions_24h":1250,"total_anomalies":62,"critical_alerts":12,
          "warnings":18,"monitoring":40,"pincodes_monitored":40,"last_updated":"2024-01-01T10:00:00"}"#,
    )
    .await;

    let stats = client(&server.url).get_stats().await.unwrap();
    assert_eq!(stats.total_transactions_24h, 1250);
    assert_eq!(stats.critical_alerts, 12);

    let request = server.request().await;
    assert!(request.starts_with("GET /api/stats "));
  }

  #[tokio::test]
  async fn test_get_trends_query() {
    let server = serve_once(
      "200 OK",
      r#"{"data":[{"date":"2022-12-30","category":"Fever","quantity":420}],"start_date":null,"end_date":null}"#,
    )
    .await;

    let trends = client(&server.url)
      .get_trends(Some("400001"), 14)
      .await
      .unwrap();
    assert_eq!(trends.data.len(), 1);
    assert_eq!(trends.total_quantity(), 420.0);

    let request = server.request().await;
    assert!(request.starts_with("GET /api/trends?pincode=400001&days=14 "));
  }

  #[tokio::test]
  async fn test_get_outbreak_status_path() {
    let server = serve_once(
      "200 OK",
      r#"{"pincode":"400001","severity":"green","confidence":0.95,"affected_count":12,"detected_at":"2024-01-01T10:00:00"}"#,
    )
    .await;

    let status = client(&server.url)
      .get_outbreak_status("400001")
      .await
      .unwrap();
    assert_eq!(status.severity, Severity::Green);

    let request = server.request().await;
    assert!(request.starts_with("GET /api/outbreak-status/400001 "));
  }

  #[tokio::test]
  async fn test_submit_transaction() {
    let server = serve_once(
      "200 OK",
      r#"{"status":"received","transaction_id":"txn_400005_1","is_anomaly":false,"severity":"normal"}"#,
    )
    .await;

    let txn = Transaction {
      timestamp: chrono::Utc::now(),
      pincode: "400005".to_string(),
      medicine_name: "Cough Syrup".to_string(),
      category: "COUGH".to_string(),
      quantity: 1,
      customer_age: Some(34),
    };
    let result = client(&server.url).submit_transaction(&txn).await.unwrap();
    assert!(!result.is_anomaly);

    let request = server.request().await;
    assert!(request.starts_with("POST /api/transactions "));
    assert!(request.contains(r#""medicine_name":"Cough Syrup""#));
  }

  #[tokio::test]
  async fn test_server_error_is_application_error() {
    let server = serve_once("500 Internal Server Error", r#"{"detail":"boom"}"#).await;

    let err = client(&server.url).get_stats().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ApplicationError);
    assert!(matches!(err, FetchError::Application { status: 500, ref message } if message == "boom"));
  }

  #[tokio::test]
  async fn test_malformed_body_is_decode_error() {
    let server = serve_once("200 OK", "<html>oops</html>").await;

    let err = client(&server.url).get_heatmap().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecodeError);
  }

  #[tokio::test]
  async fn test_connection_refused_is_transport_error() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("http://{}", addr)).unwrap();
    let err = client(&url).get_stats().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportError);
  }
}
