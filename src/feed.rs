//! Simulated pharmacy activity: generates sales, submits them for anomaly
//! scoring and keeps the most recent verdicts.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};

use crate::api::types::{Severity, Transaction, TransactionResult};
use crate::cache::FetchError;

/// Number of activities the feed keeps
pub const FEED_CAPACITY: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Medicine {
  pub name: &'static str,
  pub category: &'static str,
}

pub const MEDICINES: &[Medicine] = &[
  Medicine {
    name: "Paracetamol 500mg",
    category: "FEVER",
  },
  Medicine {
    name: "Cetirizine 10mg",
    category: "COLD",
  },
  Medicine {
    name: "Cough Syrup",
    category: "COUGH",
  },
  Medicine {
    name: "Dolo 650",
    category: "FEVER",
  },
  Medicine {
    name: "Amoxicillin",
    category: "ANTIBIOTIC",
  },
];

pub const PINCODES: &[&str] = &["400001", "400005", "400012", "400022", "400034"];

/// Deterministic round-robin over medicines and pincodes.
///
/// The pincode rotation shifts by one every full pass over the medicines so
/// every pairing eventually comes up.
#[derive(Debug, Default)]
pub struct TransactionGenerator {
  step: usize,
}

impl TransactionGenerator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn next_transaction(&mut self, now: DateTime<Utc>) -> Transaction {
    let step = self.step;
    self.step = self.step.wrapping_add(1);

    let medicine = MEDICINES[step % MEDICINES.len()];
    let pincode = PINCODES[(step + step / MEDICINES.len()) % PINCODES.len()];

    Transaction {
      timestamp: now,
      pincode: pincode.to_string(),
      medicine_name: medicine.name.to_string(),
      category: medicine.category.to_string(),
      quantity: (step % 3) as u32 + 1,
      customer_age: None,
    }
  }
}

/// A submitted sale and the backend's verdict on it
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
  pub medicine: String,
  pub category: String,
  pub pincode: String,
  pub quantity: u32,
  pub submitted_at: DateTime<Utc>,
  pub is_anomaly: bool,
  pub severity: Option<Severity>,
}

impl Activity {
  pub fn new(transaction: &Transaction, result: &TransactionResult) -> Self {
    Self {
      medicine: transaction.medicine_name.clone(),
      category: transaction.category.clone(),
      pincode: transaction.pincode.clone(),
      quantity: transaction.quantity,
      submitted_at: transaction.timestamp,
      is_anomaly: result.is_anomaly,
      severity: result.severity,
    }
  }
}

impl fmt::Display for Activity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} {} x{} ({}) at {}",
      self.submitted_at.format("%H:%M:%S"),
      self.medicine,
      self.quantity,
      self.category,
      self.pincode
    )?;
    if self.is_anomaly {
      let severity = self.severity.map_or("unknown", |s| s.as_str());
      write!(f, " ANOMALY [{}]", severity)?;
    }
    Ok(())
  }
}

/// Bounded list of recent activities, newest first
#[derive(Debug)]
pub struct ActivityFeed {
  items: VecDeque<Activity>,
  capacity: usize,
}

impl Default for ActivityFeed {
  fn default() -> Self {
    Self::with_capacity(FEED_CAPACITY)
  }
}

impl ActivityFeed {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      items: VecDeque::with_capacity(capacity),
      capacity: capacity.max(1),
    }
  }

  pub fn push(&mut self, activity: Activity) {
    self.items.push_front(activity);
    self.items.truncate(self.capacity);
  }

  pub fn iter(&self) -> impl Iterator<Item = &Activity> {
    self.items.iter()
  }

  pub fn latest(&self) -> Option<&Activity> {
    self.items.front()
  }

  pub fn anomalies(&self) -> usize {
    self.items.iter().filter(|a| a.is_anomaly).count()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

/// Generate and submit one transaction every `period`.
///
/// Stops after `count` successful submissions when given, otherwise runs
/// until the future is dropped. Failed submissions are logged and skipped.
/// `on_activity` sees the feed after every accepted submission.
pub async fn run<S, Fut, F>(
  period: Duration,
  count: Option<usize>,
  submit: S,
  mut on_activity: F,
) -> ActivityFeed
where
  S: Fn(Transaction) -> Fut,
  Fut: Future<Output = Result<TransactionResult, FetchError>>,
  F: FnMut(&ActivityFeed),
{
  let mut generator = TransactionGenerator::new();
  let mut feed = ActivityFeed::new();
  let mut submitted = 0;

  let mut ticker = time::interval(period.max(Duration::from_millis(1)));
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  while count.map_or(true, |n| submitted < n) {
    ticker.tick().await;

    let transaction = generator.next_transaction(Utc::now());
    match submit(transaction.clone()).await {
      Ok(result) => {
        if result.is_anomaly {
          tracing::info!(
            pincode = %transaction.pincode,
            medicine = %transaction.medicine_name,
            "Transaction flagged as anomaly"
          );
        }
        feed.push(Activity::new(&transaction, &result));
        submitted += 1;
        on_activity(&feed);
      }
      Err(e) => {
        tracing::warn!(error = %e, pincode = %transaction.pincode, "Failed to submit transaction");
      }
    }
  }

  feed
}
