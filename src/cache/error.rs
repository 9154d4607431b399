//! Fetch failures and the normalized shape they are recorded in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Failure produced by a resource fetcher.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
  /// Network failure, connection refused, or timeout
  #[error("transport error: {0}")]
  Transport(String),
  /// Response body could not be decoded
  #[error("decode error: {0}")]
  Decode(String),
  /// Upstream answered with a non-success status
  #[error("application error ({status}): {message}")]
  Application { status: u16, message: String },
}

impl FetchError {
  pub fn timeout(after: std::time::Duration) -> Self {
    Self::Transport(format!("request timed out after {}ms", after.as_millis()))
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Transport(_) => ErrorKind::TransportError,
      Self::Decode(_) => ErrorKind::DecodeError,
      Self::Application { .. } => ErrorKind::ApplicationError,
    }
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      Self::Decode(err.to_string())
    } else if let Some(status) = err.status() {
      Self::Application {
        status: status.as_u16(),
        message: err.to_string(),
      }
    } else {
      Self::Transport(err.to_string())
    }
  }
}

impl From<serde_json::Error> for FetchError {
  fn from(err: serde_json::Error) -> Self {
    Self::Decode(err.to_string())
  }
}

/// Error category as surfaced on a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
  TransportError,
  DecodeError,
  ApplicationError,
}

impl std::fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Self::TransportError => "TransportError",
      Self::DecodeError => "DecodeError",
      Self::ApplicationError => "ApplicationError",
    };
    f.write_str(name)
  }
}

/// The last error observed for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
  pub kind: ErrorKind,
  pub message: String,
  pub occurred_at: DateTime<Utc>,
}

impl ErrorInfo {
  pub fn new(err: &FetchError, occurred_at: DateTime<Utc>) -> Self {
    Self {
      kind: err.kind(),
      message: err.to_string(),
      occurred_at,
    }
  }
}

impl From<FetchError> for ErrorInfo {
  fn from(err: FetchError) -> Self {
    Self::new(&err, Utc::now())
  }
}
