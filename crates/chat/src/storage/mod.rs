//! Storage traits and implementations
//!
//! This module defines the storage abstraction layer for threads and
//! messages. The trait-based design allows swapping between in-memory and
//! SQLite storage.

mod batch;
mod memory;
mod sqlite;
mod traits;

pub use batch::PendingBatch;
pub use memory::InMemoryChatStore;
pub use sqlite::SqliteChatStore;
pub use traits::{ChatStore, ConsistencyError, CoverageRange};
