//! Generic polling cache for remote resources.
//!
//! This module provides a transport-agnostic refresh mechanism that:
//! - Polls each resource on a fixed interval with one timer per resource key
//! - Keeps serving the last good value when a refresh fails (stale-while-revalidate)
//! - Skips update notifications when a refetch is equal to the cached value
//! - Discards results that arrive after a newer cycle has already completed
//! - Optionally persists the last good value for offline start-up

mod entry;
mod error;
mod layer;
mod resource;
mod storage;

pub use entry::{CacheEntry, Outcome, Status};
pub use error::{ErrorInfo, ErrorKind, FetchError};
pub use layer::{CacheError, PollingCache, Subscription};
pub use resource::{BoxFetch, Resource, DEFAULT_TIMEOUT};
pub use storage::{NoopStore, Persistence, SnapshotStore, SqliteStore, StoredSnapshot};
