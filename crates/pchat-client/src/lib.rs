//! pchat client
//!
//! Polling synchronization against a pchat server: a [`ConversationMonitor`]
//! per client that notices new conversations and new activity, and a
//! [`SyncSession`] per open conversation view.

pub mod api;
pub mod config;
pub mod error;
pub mod known_chats;
pub mod monitor;
pub mod presence;
pub mod session;
pub mod window;

pub use api::{ChatApi, HttpChatApi};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use known_chats::{KnownChat, KnownChats};
pub use monitor::{ConversationMonitor, CycleReport, MonitorHandle};
pub use presence::{PresenceState, PresenceTracker};
pub use session::{SessionEvent, SessionHandle, SessionPhase, SyncSession};
pub use window::{AckOutcome, ChatWindow, Entry, EntryState};
