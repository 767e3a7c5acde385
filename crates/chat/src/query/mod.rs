//! Query API for reading an export
//!
//! Read-only views over the stored threads and messages.

mod threads;

pub use threads::{MessageView, ThreadSummary, list_threads, thread_messages, timestamp_to_datetime};
