//! Runtime state of one polled resource.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::error::{ErrorInfo, FetchError};

/// Freshness of the value held by a [`CacheEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
  /// A fetch is in flight; any existing value is still visible
  Loading,
  /// The last fetch succeeded
  Fresh,
  /// The last fetch failed but an earlier value is still served
  Stale,
  /// The last fetch failed and no value has ever been obtained
  Failed,
}

impl Status {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Loading => "loading",
      Self::Fresh => "fresh",
      Self::Stale => "stale",
      Self::Failed => "failed",
    }
  }
}

impl std::fmt::Display for Status {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.pad(self.as_str())
  }
}

/// Immutable snapshot of a resource's cache state.
///
/// `value` is shared by reference: two snapshots whose values are
/// `Arc::ptr_eq` hold the same fetched value, which is how consumers detect
/// that nothing changed.
#[derive(Debug)]
pub struct CacheEntry<T> {
  pub value: Option<Arc<T>>,
  pub status: Status,
  pub last_success_at: Option<DateTime<Utc>>,
  pub last_error: Option<ErrorInfo>,
  /// Generation of the last applied successful fetch
  pub generation: u64,
}

// Manual impl so snapshots are cloneable without `T: Clone`.
impl<T> Clone for CacheEntry<T> {
  fn clone(&self) -> Self {
    Self {
      value: self.value.clone(),
      status: self.status,
      last_success_at: self.last_success_at,
      last_error: self.last_error.clone(),
      generation: self.generation,
    }
  }
}

impl<T> Default for CacheEntry<T> {
  fn default() -> Self {
    Self::new()
  }
}

/// What applying a fetch outcome did to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  /// The outcome belonged to a cycle older than the last applied one
  Discarded,
  Applied {
    status_changed: bool,
    value_replaced: bool,
  },
}

impl Outcome {
  /// Whether subscribers should be woken.
  pub fn notifies(&self) -> bool {
    match self {
      Self::Discarded => false,
      Self::Applied {
        status_changed,
        value_replaced,
      } => *status_changed || *value_replaced,
    }
  }

  pub fn value_replaced(&self) -> bool {
    matches!(
      self,
      Self::Applied {
        value_replaced: true,
        ..
      }
    )
  }
}

impl<T> CacheEntry<T> {
  /// A fresh entry with no value, awaiting its first fetch.
  pub fn new() -> Self {
    Self {
      value: None,
      status: Status::Loading,
      last_success_at: None,
      last_error: None,
      generation: 0,
    }
  }

  /// An entry seeded from persisted data; the first fetch is still pending.
  pub fn seeded(value: T, stored_at: DateTime<Utc>) -> Self {
    Self {
      value: Some(Arc::new(value)),
      last_success_at: Some(stored_at),
      ..Self::new()
    }
  }

  pub fn has_value(&self) -> bool {
    self.value.is_some()
  }

  pub fn value(&self) -> Option<&T> {
    self.value.as_deref()
  }

  /// Mark the start of a polling cycle. The value is left untouched.
  ///
  /// Returns true if the status changed.
  pub fn begin_cycle(&mut self) -> bool {
    let changed = self.status != Status::Loading;
    self.status = Status::Loading;
    changed
  }

  /// Apply a successful fetch from the cycle numbered `generation`.
  pub fn apply_success(
    &mut self,
    generation: u64,
    fetched: T,
    equal: &(dyn Fn(&T, &T) -> bool + Send + Sync),
    now: DateTime<Utc>,
  ) -> Outcome {
    if generation < self.generation {
      return Outcome::Discarded;
    }

    let status_changed = self.status != Status::Fresh;
    let unchanged = self
      .value
      .as_deref()
      .is_some_and(|current| equal(current, &fetched));

    // An equal refetch only refreshes timing; the last error stays on record.
    if !unchanged {
      self.value = Some(Arc::new(fetched));
      self.last_error = None;
    }
    self.status = Status::Fresh;
    self.last_success_at = Some(now);
    self.generation = generation;

    Outcome::Applied {
      status_changed,
      value_replaced: !unchanged,
    }
  }

  /// Apply a failed fetch from the cycle numbered `generation`.
  pub fn apply_failure(
    &mut self,
    generation: u64,
    err: &FetchError,
    now: DateTime<Utc>,
  ) -> Outcome {
    if generation < self.generation {
      return Outcome::Discarded;
    }

    let next = if self.value.is_some() {
      Status::Stale
    } else {
      Status::Failed
    };
    let status_changed = self.status != next;
    self.status = next;
    self.last_error = Some(ErrorInfo::new(err, now));

    Outcome::Applied {
      status_changed,
      value_replaced: false,
    }
  }
}
