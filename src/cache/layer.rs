//! Polling cache that shares one refresh loop per resource key.

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, Outcome};
use super::error::FetchError;
use super::resource::Resource;

/// Errors returned by [`PollingCache::subscribe`].
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  #[error("resource {key} is already cached with a different value type")]
  TypeMismatch { key: String },
}

/// Channels a new subscriber attaches to.
struct Channels<T> {
  state: Arc<watch::Sender<CacheEntry<T>>>,
  refresh: mpsc::UnboundedSender<()>,
}

struct Slot {
  subscribers: usize,
  /// `Channels<T>` for the resource's value type
  channels: Box<dyn Any + Send>,
  driver: JoinHandle<()>,
}

/// Cache of polled resources.
///
/// Each resource key gets a single driver task that owns the timer and the
/// in-flight fetches. Every subscriber of that key reads the same
/// [`CacheEntry`]. The driver is started by the first subscriber and aborted
/// when the last one goes away.
#[derive(Clone, Default)]
pub struct PollingCache {
  slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl PollingCache {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
    // Critical sections never panic, so a poisoned map is still consistent.
    self.slots.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Register interest in `resource`.
  ///
  /// The first subscriber for a key starts its polling loop, which fetches
  /// immediately. Later subscribers attach to the running loop. Must be called
  /// from within a tokio runtime.
  pub fn subscribe<T>(&self, resource: &Resource<T>) -> Result<Subscription<T>, CacheError>
  where
    T: Send + Sync + 'static,
  {
    let key = resource.key().to_string();
    if let Some(subscription) = self.attach(&mut self.lock(), &key)? {
      return Ok(subscription);
    }

    // Snapshot store I/O happens without the slots lock held.
    let entry = match resource.persistence().and_then(|p| p.load()) {
      Some((value, stored_at)) => {
        debug!(key = %key, %stored_at, "Seeded entry from snapshot store");
        CacheEntry::seeded(value, stored_at)
      }
      None => CacheEntry::new(),
    };

    let mut slots = self.lock();
    // Another subscriber may have started the poller while the store was read.
    if let Some(subscription) = self.attach(&mut slots, &key)? {
      return Ok(subscription);
    }

    let (state_tx, state_rx) = watch::channel(entry);
    let state = Arc::new(state_tx);
    let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

    let driver = Driver {
      resource: resource.clone(),
      state: Arc::clone(&state),
      refresh: refresh_rx,
      issued: 0,
    };
    let driver = tokio::spawn(driver.run());

    info!(
      key = %key,
      description = resource.description(),
      interval_ms = resource.interval().as_millis() as u64,
      "Started polling"
    );

    slots.insert(
      key.clone(),
      Slot {
        subscribers: 1,
        channels: Box::new(Channels {
          state,
          refresh: refresh_tx.clone(),
        }),
        driver,
      },
    );

    Ok(Subscription {
      cache: self.clone(),
      state: state_rx,
      refresh: refresh_tx,
      key,
    })
  }

  /// Join the running poller for `key`, if there is one.
  fn attach<T>(
    &self,
    slots: &mut HashMap<String, Slot>,
    key: &str,
  ) -> Result<Option<Subscription<T>>, CacheError>
  where
    T: Send + Sync + 'static,
  {
    let Some(slot) = slots.get_mut(key) else {
      return Ok(None);
    };
    let channels = slot
      .channels
      .downcast_ref::<Channels<T>>()
      .ok_or_else(|| CacheError::TypeMismatch {
        key: key.to_string(),
      })?;
    slot.subscribers += 1;
    debug!(key, subscribers = slot.subscribers, "Attached to running poller");

    Ok(Some(Subscription {
      cache: self.clone(),
      state: channels.state.subscribe(),
      refresh: channels.refresh.clone(),
      key: key.to_string(),
    }))
  }

  /// Number of live subscriptions for `key`.
  pub fn subscriber_count(&self, key: &str) -> usize {
    self.lock().get(key).map_or(0, |slot| slot.subscribers)
  }

  /// Whether a polling loop is running for `key`.
  pub fn is_polling(&self, key: &str) -> bool {
    self.lock().contains_key(key)
  }

  /// Number of resources currently being polled.
  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  fn release(&self, key: &str) {
    let mut slots = self.lock();
    let Some(slot) = slots.get_mut(key) else {
      return;
    };

    slot.subscribers = slot.subscribers.saturating_sub(1);
    if slot.subscribers > 0 {
      debug!(key, subscribers = slot.subscribers, "Detached from poller");
      return;
    }

    if let Some(slot) = slots.remove(key) {
      // Dropping the driver future drops its timer and any in-flight fetch.
      slot.driver.abort();
      info!(key, "Stopped polling");
    }
  }
}

impl std::fmt::Debug for PollingCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let slots = self.lock();
    let mut keys: Vec<&String> = slots.keys().collect();
    keys.sort();
    f.debug_struct("PollingCache").field("keys", &keys).finish()
  }
}

/// A consumer's handle on a polled resource.
///
/// Dropping the handle unsubscribes.
pub struct Subscription<T> {
  cache: PollingCache,
  key: String,
  state: watch::Receiver<CacheEntry<T>>,
  refresh: mpsc::UnboundedSender<()>,
}

impl<T> Subscription<T> {
  pub fn key(&self) -> &str {
    &self.key
  }

  /// Current snapshot of the entry.
  pub fn snapshot(&self) -> CacheEntry<T> {
    self.state.borrow().clone()
  }

  /// Current snapshot, marked as seen so `changed` only reports later updates.
  pub fn latest(&mut self) -> CacheEntry<T> {
    self.state.borrow_and_update().clone()
  }

  /// Wait until the status or the value reference changes, then return the
  /// new snapshot. Returns `None` once the poller is gone.
  pub async fn changed(&mut self) -> Option<CacheEntry<T>> {
    self.state.changed().await.ok()?;
    Some(self.state.borrow_and_update().clone())
  }

  /// Whether a notification is pending that `changed` would return at once.
  pub fn has_changed(&self) -> bool {
    self.state.has_changed().unwrap_or(false)
  }

  /// Start an out-of-cycle fetch without resetting the polling timer.
  pub fn force_refresh(&self) {
    if self.refresh.send(()).is_err() {
      debug!(key = %self.key, "Refresh requested after poller stopped");
    }
  }

  /// Give up interest in the resource. Same as dropping the handle.
  pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) {
    self.cache.release(&self.key);
  }
}

impl<T> std::fmt::Debug for Subscription<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.key)
      .finish_non_exhaustive()
  }
}

/// When the first scheduled tick fires. Periods too large to add to `now`
/// land in the far future, which amounts to never ticking.
fn first_tick(now: Instant, period: Duration) -> Instant {
  now
    .checked_add(period)
    .unwrap_or_else(|| now + FAR_FUTURE)
}

/// Roughly thirty years
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Per-resource refresh loop. All entry mutation happens here.
struct Driver<T> {
  resource: Resource<T>,
  state: Arc<watch::Sender<CacheEntry<T>>>,
  refresh: mpsc::UnboundedReceiver<()>,
  /// Highest generation handed out so far
  issued: u64,
}

impl<T: Send + Sync + 'static> Driver<T> {
  async fn run(mut self) {
    let period = self.resource.interval().max(Duration::from_millis(1));
    let mut ticker = time::interval_at(first_tick(Instant::now(), period), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut in_flight = FuturesUnordered::new();
    in_flight.push(self.start_cycle());

    loop {
      tokio::select! {
        _ = ticker.tick() => in_flight.push(self.start_cycle()),
        Some(()) = self.refresh.recv() => in_flight.push(self.start_cycle()),
        Some((generation, result)) = in_flight.next(), if !in_flight.is_empty() => {
          self.complete(generation, result);
        }
      }
    }
  }

  fn start_cycle(&mut self) -> impl Future<Output = (u64, Result<T, FetchError>)> {
    self.issued += 1;
    let generation = self.issued;
    self.state.send_if_modified(|entry| entry.begin_cycle());
    debug!(key = self.resource.key(), generation, "Fetch started");

    let fetch = self.resource.fetch();
    let timeout = self.resource.timeout();
    async move {
      let result = match time::timeout(timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::timeout(timeout)),
      };
      (generation, result)
    }
  }

  fn complete(&self, generation: u64, result: Result<T, FetchError>) {
    let key = self.resource.key();
    let now = Utc::now();
    let mut outcome = Outcome::Discarded;

    match result {
      Ok(value) => {
        let equal = self.resource.equality();
        self.state.send_if_modified(|entry| {
          outcome = entry.apply_success(generation, value, equal, now);
          outcome.notifies()
        });

        if outcome.value_replaced() {
          if let Some(persistence) = self.resource.persistence() {
            let value = self.state.borrow().value.clone();
            if let Some(value) = value {
              persistence.save(&value);
            }
          }
        }
        if outcome != Outcome::Discarded {
          debug!(key, generation, replaced = outcome.value_replaced(), "Fetch succeeded");
        }
      }
      Err(err) => {
        self.state.send_if_modified(|entry| {
          outcome = entry.apply_failure(generation, &err, now);
          outcome.notifies()
        });
        if outcome != Outcome::Discarded {
          warn!(key, generation, error = %err, "Fetch failed");
        }
      }
    }

    if outcome == Outcome::Discarded {
      debug!(key, generation, "Discarded out-of-order fetch result");
    }
  }
}
