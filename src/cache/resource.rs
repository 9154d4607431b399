//! Description of one polled remote value.

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use super::error::FetchError;
use super::storage::{Persistence, SnapshotStore};

/// Default upper bound on a single fetch.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A boxed future that returns a Result<T, FetchError>
pub type BoxFetch<T> = Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send>>;

/// A factory function that creates futures for fetching data
type FetcherFn<T> = Arc<dyn Fn() -> BoxFetch<T> + Send + Sync>;

/// Decides whether a freshly fetched value is a no-op update
type EqualityFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// A named, typed remote value polled on a fixed interval.
///
/// Resources with the same `key` share one cache entry, one timer and one
/// request per cycle inside a [`PollingCache`](super::PollingCache).
pub struct Resource<T> {
  key: String,
  description: String,
  fetcher: FetcherFn<T>,
  interval: Duration,
  timeout: Duration,
  equality: EqualityFn<T>,
  persistence: Option<Persistence<T>>,
}

impl<T> Clone for Resource<T> {
  fn clone(&self) -> Self {
    Self {
      key: self.key.clone(),
      description: self.description.clone(),
      fetcher: Arc::clone(&self.fetcher),
      interval: self.interval,
      timeout: self.timeout,
      equality: Arc::clone(&self.equality),
      persistence: self.persistence.clone(),
    }
  }
}

impl<T: Send + Sync + 'static> Resource<T> {
  /// Create a resource compared with `PartialEq`.
  ///
  /// The fetcher is called once per polling cycle.
  ///
  /// # Example
  ///
  /// ```ignore
  /// let client = backend.clone();
  /// let stats = Resource::new("/api/stats", Duration::from_secs(30), move || {
  ///     let client = client.clone();
  ///     async move { client.get_stats().await }
  /// });
  /// ```
  pub fn new<F, Fut>(key: impl Into<String>, interval: Duration, fetcher: F) -> Self
  where
    T: PartialEq,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let key = key.into();
    let fetcher: FetcherFn<T> = Arc::new(move || -> BoxFetch<T> { Box::pin(fetcher()) });
    Self {
      description: key.clone(),
      key,
      fetcher,
      interval,
      timeout: DEFAULT_TIMEOUT,
      equality: Arc::new(|a: &T, b: &T| a == b),
      persistence: None,
    }
  }

  /// Replace the equality used to detect no-op updates.
  pub fn with_equality<E>(mut self, equality: E) -> Self
  where
    E: Fn(&T, &T) -> bool + Send + Sync + 'static,
  {
    self.equality = Arc::new(equality);
    self
  }

  /// Set the per-fetch timeout. A timed out fetch counts as a transport error.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Set a human readable description, used in logs and the snapshot store.
  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  /// Persist the last good value in `store`.
  pub fn persisted(mut self, store: Arc<dyn SnapshotStore>) -> Self
  where
    T: Serialize + DeserializeOwned,
  {
    self.persistence = Some(Persistence::new(store, &self.key, &self.description));
    self
  }
}

impl<T> Resource<T> {
  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn description(&self) -> &str {
    &self.description
  }

  pub fn interval(&self) -> Duration {
    self.interval
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  pub(crate) fn fetch(&self) -> BoxFetch<T> {
    (self.fetcher)()
  }

  pub(crate) fn equality(&self) -> &(dyn Fn(&T, &T) -> bool + Send + Sync) {
    self.equality.as_ref()
  }

  pub(crate) fn persistence(&self) -> Option<&Persistence<T>> {
    self.persistence.as_ref()
  }
}

impl<T> std::fmt::Debug for Resource<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Resource")
      .field("key", &self.key)
      .field("interval", &self.interval)
      .field("timeout", &self.timeout)
      .field("persisted", &self.persistence.is_some())
      .finish_non_exhaustive()
  }
}
