//! Sync engine for fetching and storing chat history
//!
//! Provides idempotent sync operations that can be safely re-run after any
//! interruption: every write is an upsert, and what to fetch is recomputed
//! from the stored coverage on each run.

mod error;
mod fetcher;
mod orchestrator;
mod retry;

pub use error::SyncError;
pub use fetcher::ThreadFetcher;
pub use orchestrator::{
    RecordedError, SyncReport, SyncStats, ThreadPhase, ThreadSyncStats, sync_account, sync_thread,
};
pub use retry::RetryPolicy;

use serde::{Deserialize, Serialize};

use crate::models::Location;

/// Remote's undocumented page cap is above this; 100 has proven reliable
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Settings shared by the fetcher and the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Messages requested per page
    pub page_size: usize,
    /// Backoff for transient remote failures
    pub retry: RetryPolicy,
    /// Account folders whose threads are synced
    pub locations: Vec<Location>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
            locations: Location::defaults(),
        }
    }
}
