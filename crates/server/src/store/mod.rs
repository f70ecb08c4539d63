//! Server-side storage
//!
//! The append-only message log and the conversation directory, both kept in
//! memory and persisted as JSON with atomic writes.

pub mod directory;
pub mod message_log;
pub mod persist;

pub use directory::{Conversation, ConversationDirectory};
pub use message_log::{MessageLog, RetentionPolicy};
