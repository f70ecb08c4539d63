//! Configuration for the pchat client.

use std::time::Duration;

/// Configuration for monitors and sync sessions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server origin, without a trailing slash.
    pub base_url: String,
    /// Identity sent in the `x-user` header.
    pub user_id: String,
    /// Conversation monitor cycle.
    pub monitor_interval: Duration,
    /// Session fetch cycle.
    pub poll_interval: Duration,
    /// Minimum spacing between presence samples.
    pub presence_interval: Duration,
    /// Inactivity after which a partner counts as idle.
    pub idle_threshold: Duration,
    /// Maximum entries kept in a conversation view.
    pub display_cap: usize,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: std::env::var("PCHAT_SERVER_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),
            user_id: String::new(),
            monitor_interval: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            presence_interval: Duration::from_secs(30),
            idle_threshold: Duration::from_secs(5 * 60),
            display_cap: 100,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}
