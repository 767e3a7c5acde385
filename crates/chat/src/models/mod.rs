//! Domain models for chat entities

mod message;
mod thread;

pub use message::{Message, MessageId};
pub use thread::{Location, Thread, ThreadId};
