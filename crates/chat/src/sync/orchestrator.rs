//! Account-wide sync: reconcile stored coverage with the remote, thread by thread

use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

use log::{debug, error, info, warn};

use super::{SyncError, SyncOptions, ThreadFetcher};
use crate::models::{Location, Thread, ThreadId};
use crate::remote::api::ThreadKind;
use crate::remote::{RemoteSource, project_thread};
use crate::storage::{ChatStore, CoverageRange, PendingBatch};

/// Where a thread is in its sync when something happens to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPhase {
    /// Listed, nothing fetched yet
    New,
    /// No stored messages; walking the whole thread once
    FirstSync,
    /// Stored messages found; coverage will be extended both ways
    HasCoverage,
    /// Extending coverage older than the oldest stored message
    Backfilling,
    /// Collecting messages newer than the newest stored message
    ForwardFilling,
    /// Comparing the stored count with the remote's total
    Verifying,
    Done,
}

impl fmt::Display for ThreadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreadPhase::New => "listing",
            ThreadPhase::FirstSync => "first sync",
            ThreadPhase::HasCoverage => "reading coverage",
            ThreadPhase::Backfilling => "backfilling",
            ThreadPhase::ForwardFilling => "forward-filling",
            ThreadPhase::Verifying => "verifying",
            ThreadPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// An error recorded during a run. Recording never stops the run.
#[derive(Debug, thiserror::Error)]
pub enum RecordedError {
    #[error("Listing {location} threads failed: {error}")]
    Listing {
        location: Location,
        #[source]
        error: SyncError,
    },

    #[error("Thread {thread_name} ({thread_id}) failed while {phase}: {error}")]
    Thread {
        thread_id: ThreadId,
        thread_name: String,
        phase: ThreadPhase,
        #[source]
        error: SyncError,
    },
}

impl RecordedError {
    fn thread(thread: &Thread, phase: ThreadPhase, error: SyncError) -> Self {
        RecordedError::Thread {
            thread_id: thread.id.clone(),
            thread_name: thread.display_name().to_string(),
            phase,
            error,
        }
    }

    /// The underlying sync error
    pub fn error(&self) -> &SyncError {
        match self {
            RecordedError::Listing { error, .. } | RecordedError::Thread { error, .. } => error,
        }
    }
}

/// Messages written for one thread
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThreadSyncStats {
    pub first_sync: usize,
    pub backfilled: usize,
    pub forward_filled: usize,
}

/// Statistics from a sync run
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    /// Threads returned by the remote across all locations, after de-duplication
    pub threads_listed: usize,
    /// Threads dropped because the message API cannot serve them
    pub threads_filtered: usize,
    /// Threads that finished without error
    pub threads_synced: usize,
    /// Threads with a recorded error
    pub threads_failed: usize,
    /// Messages written by first-time syncs
    pub messages_first_sync: usize,
    /// Messages written while extending coverage to older messages
    pub messages_backfilled: usize,
    /// Messages committed while extending coverage to newer messages
    pub messages_forward_filled: usize,
    /// Duration of the sync run
    pub duration_ms: u64,
}

impl SyncStats {
    fn add(&mut self, thread: ThreadSyncStats) {
        self.messages_first_sync += thread.first_sync;
        self.messages_backfilled += thread.backfilled;
        self.messages_forward_filled += thread.forward_filled;
    }
}

/// Outcome of a whole run
#[derive(Debug, Default)]
pub struct SyncReport {
    pub stats: SyncStats,
    pub errors: Vec<RecordedError>,
}

impl SyncReport {
    /// A run succeeds only if no error was recorded anywhere
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(&mut self, error: RecordedError) {
        error!("{}", error);
        self.errors.push(error);
    }
}

/// Sync every thread of the account into `store`.
///
/// Threads are processed one at a time. A failure in one thread is recorded
/// and the run moves on; whatever a thread managed to store stays stored,
/// and re-running picks up from there.
pub fn sync_account<S: RemoteSource + ?Sized>(
    source: &S,
    store: &dyn ChatStore,
    options: &SyncOptions,
) -> SyncReport {
    let start = Instant::now();
    let mut report = SyncReport::default();

    let threads = list_all_threads(source, options, &mut report);

    for thread in &threads {
        match sync_thread(source, store, options, thread) {
            Ok(stats) => {
                report.stats.add(stats);
                report.stats.threads_synced += 1;
            }
            Err((stats, error)) => {
                report.stats.add(stats);
                report.stats.threads_failed += 1;
                report.record(error);
            }
        }
    }

    report.stats.duration_ms = start.elapsed().as_millis() as u64;
    if report.is_success() {
        info!(
            "Synced {} threads in {}ms",
            report.stats.threads_synced, report.stats.duration_ms
        );
    } else {
        error!("Had {} errors during export", report.errors.len());
    }
    report
}

/// List threads from every configured location.
///
/// Marketplace threads are dropped; a thread listed in several locations is
/// kept once, from the first location that lists it.
fn list_all_threads<S: RemoteSource + ?Sized>(
    source: &S,
    options: &SyncOptions,
    report: &mut SyncReport,
) -> Vec<Thread> {
    let mut seen = HashSet::new();
    let mut threads = Vec::new();

    for &location in &options.locations {
        info!("fetching threads: {}", location);
        let what = format!("listing {}", location);
        let listed = match options.retry.run(&what, || source.list_threads(location)) {
            Ok(listed) => listed,
            Err(error) => {
                report.record(RecordedError::Listing { location, error });
                continue;
            }
        };

        let before = listed.len();
        let listed: Vec<_> = listed
            .into_iter()
            .filter(|t| t.kind != ThreadKind::Marketplace)
            .collect();
        let filtered = before - listed.len();
        if filtered > 0 {
            warn!("Filtered out {} threads of type MARKETPLACE", filtered);
            report.stats.threads_filtered += filtered;
        }

        for remote in listed {
            if !seen.insert(remote.uid.clone()) {
                continue;
            }
            match project_thread(&remote) {
                Ok(thread) => threads.push(thread),
                Err(source) => {
                    let placeholder = Thread::new(ThreadId::new(&remote.uid), remote.name, 0, 0);
                    let error = SyncError::Malformed {
                        thread_id: placeholder.id.clone(),
                        source,
                    };
                    report.record(RecordedError::thread(&placeholder, ThreadPhase::New, error));
                }
            }
        }
    }

    report.stats.threads_listed = threads.len();
    threads
}

type ThreadResult = Result<ThreadSyncStats, (ThreadSyncStats, RecordedError)>;

/// Sync one thread: refresh its metadata, extend stored coverage, verify.
///
/// On error, returns what was written before the failure alongside it.
pub fn sync_thread<S: RemoteSource + ?Sized>(
    source: &S,
    store: &dyn ChatStore,
    options: &SyncOptions,
    thread: &Thread,
) -> ThreadResult {
    let mut stats = ThreadSyncStats::default();
    let fail = |stats: ThreadSyncStats, phase: ThreadPhase, error: SyncError| -> ThreadResult {
        Err((stats, RecordedError::thread(thread, phase, error)))
    };
    let enter = |phase: ThreadPhase| debug!("thread {}: {}", thread.display_name(), phase);

    enter(ThreadPhase::New);

    if let Err(e) = store.upsert_thread(thread) {
        return fail(stats, ThreadPhase::New, SyncError::Store(e));
    }

    let coverage = match store.coverage_range(&thread.id) {
        Ok(coverage) => coverage,
        Err(e) => return fail(stats, ThreadPhase::HasCoverage, SyncError::Store(e)),
    };

    match coverage {
        None => {
            enter(ThreadPhase::FirstSync);
            let written = &mut stats.first_sync;
            if let Err(e) = write_incrementally(source, store, options, thread, None, written) {
                return fail(stats, ThreadPhase::FirstSync, e);
            }
        }
        Some(range) => {
            enter(ThreadPhase::HasCoverage);
            enter(ThreadPhase::Backfilling);
            if let Err(e) = write_incrementally(
                source,
                store,
                options,
                thread,
                Some(range.oldest),
                &mut stats.backfilled,
            ) {
                return fail(stats, ThreadPhase::Backfilling, e);
            }

            enter(ThreadPhase::ForwardFilling);
            match forward_fill(source, store, options, thread, range) {
                Ok(written) => stats.forward_filled = written,
                Err(e) => return fail(stats, ThreadPhase::ForwardFilling, e),
            }
        }
    }

    enter(ThreadPhase::Verifying);
    if let Err(e) = store.verify_count(thread) {
        return fail(stats, ThreadPhase::Verifying, SyncError::from_store(e));
    }

    enter(ThreadPhase::Done);
    Ok(stats)
}

/// Walk the thread from `start_before` to its very first message, writing
/// each message as it arrives. Any prefix of this walk is safe to keep: the
/// next run resumes from the oldest stored message.
fn write_incrementally<S: RemoteSource + ?Sized>(
    source: &S,
    store: &dyn ChatStore,
    options: &SyncOptions,
    thread: &Thread,
    start_before: Option<i64>,
    written: &mut usize,
) -> Result<(), SyncError> {
    let mut fetcher = ThreadFetcher::new(source, thread, start_before, options);
    for result in fetcher.by_ref() {
        let message = result?;
        store.upsert_message(&message).map_err(SyncError::Store)?;
        *written += 1;
    }
    debug!(
        "thread {}: {} messages over {} pages",
        thread.display_name(),
        fetcher.yielded(),
        fetcher.pages_fetched()
    );
    Ok(())
}

/// Collect messages newer than the stored coverage and commit them at once.
///
/// The remote can only be walked from the newest message backwards, so the
/// new messages are gathered until the walk reaches stored coverage. They
/// must land together: a partial commit would move the stored newest
/// timestamp past a gap that the next run could not see.
fn forward_fill<S: RemoteSource + ?Sized>(
    source: &S,
    store: &dyn ChatStore,
    options: &SyncOptions,
    thread: &Thread,
    coverage: CoverageRange,
) -> Result<usize, SyncError> {
    let newest = coverage.newest;
    let mut batch = PendingBatch::new(thread.id.clone());

    let mut fetcher = ThreadFetcher::new(source, thread, None, options);
    while let Some(result) = fetcher.next() {
        let message = result?;

        if message.timestamp < newest {
            info!(
                "{}: fetched all new messages (up to {})",
                thread.display_name(),
                newest
            );
            break;
        }

        // Reached stored coverage: finish this page, request no more.
        // Same millisecond as the newest stored message: keep only what's missing.
        if coverage.contains(message.timestamp) {
            fetcher.stop_after_page();
            if store.has_message(&message.id).map_err(SyncError::Store)? {
                continue;
            }
        }

        batch.push(message);
    }

    if !batch.is_empty() {
        info!(
            "{}: committing {} new messages",
            thread.display_name(),
            batch.len()
        );
    }
    batch.commit(store).map_err(SyncError::Store)
}
