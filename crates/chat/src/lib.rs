//! Chat crate - incremental export of a chat account's message history
//!
//! This crate provides:
//! - Domain models (Thread, Message)
//! - The remote source boundary, an HTTP client and a scripted fake
//! - Storage trait abstractions with SQLite and in-memory backends
//! - Idempotent, resumable sync engine
//! - Query API for reading an export

pub mod config;
pub mod models;
pub mod query;
pub mod remote;
pub mod storage;
pub mod sync;

pub use crate::config::{RemoteConfig, SessionCookies};
pub use models::{Location, Message, MessageId, Thread, ThreadId};
pub use query::{MessageView, ThreadSummary, list_threads, thread_messages};
pub use remote::{HttpSource, RemoteError, RemoteSource};
pub use storage::{ChatStore, ConsistencyError, CoverageRange, InMemoryChatStore, SqliteChatStore};
pub use sync::{
    RecordedError, RetryPolicy, SyncError, SyncOptions, SyncReport, SyncStats, ThreadFetcher,
    sync_account, sync_thread,
};
