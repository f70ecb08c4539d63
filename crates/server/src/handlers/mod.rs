//! HTTP handlers

pub mod chat;
pub mod presence;

pub use crate::config::AppState;
