use chrono::{DateTime, Utc};
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::{CacheEntry, ErrorInfo, Status, Subscription};

/// Application events
#[derive(Debug)]
pub enum Event {
  /// A watched resource changed status or value
  Update(PanelUpdate),
  /// Ctrl-C was pressed
  Shutdown,
}

/// Rendered view of one cache notification
#[derive(Debug, Clone)]
pub struct PanelUpdate {
  pub key: String,
  pub status: Status,
  /// One-line summary of the current value, if any
  pub summary: Option<String>,
  pub last_success_at: Option<DateTime<Utc>>,
  pub error: Option<ErrorInfo>,
}

impl PanelUpdate {
  pub fn from_entry<T>(key: &str, entry: &CacheEntry<T>, summarize: impl Fn(&T) -> String) -> Self {
    Self {
      key: key.to_string(),
      status: entry.status,
      summary: entry.value().map(summarize),
      last_success_at: entry.last_success_at,
      error: entry.last_error.clone(),
    }
  }
}

impl fmt::Display for PanelUpdate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{:<7}] {}", self.status, self.key)?;
    match &self.summary {
      Some(summary) => write!(f, ": {}", summary)?,
      None => write!(f, ": (no data)")?,
    }
    if let Some(at) = self.last_success_at {
      write!(f, " (as of {})", at.format("%H:%M:%S"))?;
    }
    if let Some(err) = &self.error {
      write!(f, " [{}: {}]", err.kind, err.message)?;
    }
    Ok(())
  }
}

/// Merges notifications from many subscriptions, plus Ctrl-C, into one
/// stream of [`Event`]s.
///
/// Each watched subscription is owned by a forwarding task; dropping the
/// handler aborts those tasks and so unsubscribes.
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
  tasks: Vec<JoinHandle<()>>,
}

impl Default for EventHandler {
  fn default() -> Self {
    Self::new()
  }
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      tx,
      rx,
      tasks: Vec::new(),
    }
  }

  /// Emit [`Event::Shutdown`] on Ctrl-C.
  pub fn listen_for_shutdown(&mut self) {
    let tx = self.tx.clone();
    self.tasks.push(tokio::spawn(async move {
      match tokio::signal::ctrl_c().await {
        Ok(()) => {
          let _ = tx.send(Event::Shutdown);
        }
        Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl-C"),
      }
    }));
  }

  /// Forward the current snapshot and every later change of `subscription`.
  pub fn watch<T, F>(&mut self, mut subscription: Subscription<T>, summarize: F)
  where
    T: Send + Sync + 'static,
    F: Fn(&T) -> String + Send + 'static,
  {
    let tx = self.tx.clone();
    self.tasks.push(tokio::spawn(async move {
      let key = subscription.key().to_string();
      let initial = subscription.latest();
      if tx
        .send(Event::Update(PanelUpdate::from_entry(&key, &initial, &summarize)))
        .is_err()
      {
        return;
      }

      while let Some(entry) = subscription.changed().await {
        let update = PanelUpdate::from_entry(&key, &entry, &summarize);
        if tx.send(Event::Update(update)).is_err() {
          break;
        }
      }
    }));
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

impl Drop for EventHandler {
  fn drop(&mut self) {
    for task in &self.tasks {
      task.abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{FetchError, PollingCache, Resource};
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  fn counter_resource(key: &str) -> Resource<u32> {
    let calls = Arc::new(AtomicU32::new(0));
    Resource::new(key, Duration::from_secs(30), move || {
      let n = calls.fetch_add(1, Ordering::SeqCst);
      async move {
        if n == 1 {
          Err(FetchError::Transport("connection reset".to_string()))
        } else {
          Ok(n)
        }
      }
    })
  }

  async fn next_update(events: &mut EventHandler) -> PanelUpdate {
    match events.next().await {
      Some(Event::Update(update)) => update,
      other => panic!("expected update, got {:?}", other),
    }
  }

  /// Skip intermediate notifications until one reaches `status`.
  async fn until_status(events: &mut EventHandler, status: Status) -> PanelUpdate {
    loop {
      let update = next_update(events).await;
      if update.status == status {
        return update;
      }
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_forwards_initial_and_changes() {
    let cache = PollingCache::new();
    let resource = counter_resource("test:counter");
    let mut events = EventHandler::new();
    events.watch(cache.subscribe(&resource).unwrap(), |n| format!("n={}", n));

    // The driver may finish its first fetch before the forwarder starts, so
    // the initial snapshot is either Loading or already the first Fresh value.
    let initial = next_update(&mut events).await;
    assert_eq!(initial.key, "test:counter");
    let fresh = if initial.status == Status::Fresh {
      initial
    } else {
      assert_eq!(initial.status, Status::Loading);
      until_status(&mut events, Status::Fresh).await
    };
    assert_eq!(fresh.summary.as_deref(), Some("n=0"));

    // Second cycle fails; the value is kept
    let stale = until_status(&mut events, Status::Stale).await;
    assert_eq!(stale.summary.as_deref(), Some("n=0"));
    assert!(stale.error.is_some());
  }

  #[tokio::test(start_paused = true)]
  async fn test_drop_unsubscribes() {
    let cache = PollingCache::new();
    let resource = counter_resource("test:dropped");
    let mut events = EventHandler::new();
    events.watch(cache.subscribe(&resource).unwrap(), |n| n.to_string());
    assert!(cache.is_polling("test:dropped"));

    drop(events);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(!cache.is_polling("test:dropped"));
  }

  #[test]
  fn test_display_includes_error() {
    let update = PanelUpdate {
      key: "backend:/api/stats".to_string(),
      status: Status::Failed,
      summary: None,
      last_success_at: None,
      error: Some(ErrorInfo::from(FetchError::Transport("refused".to_string()))),
    };
    let line = update.to_string();
    assert!(line.starts_with("[failed ] backend:/api/stats: (no data)"));
    assert!(line.contains("refused"));
  }
}
