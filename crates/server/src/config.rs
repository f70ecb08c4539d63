//! Chat server configuration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::sync::SyncEndpoint;
use crate::users::UserStore;

/// Configuration for the pchat server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Root of all persisted state
    pub data_dir: PathBuf,
    /// Per-conversation message logs
    pub log_dir: PathBuf,
    /// Port to listen on
    pub port: u16,
    /// Messages older than this are removed by an expiry sweep
    pub retention: Duration,
    /// Storage cap per conversation, enforced by the expiry sweep
    pub max_retained: usize,
    /// Size of the "recent" view
    pub recent_limit: usize,
    /// A post triggers an expiry sweep with probability 1 / expiry_chance
    pub expiry_chance: u32,
    /// A since-fetch touches last-seen with probability 1 / last_seen_chance
    pub last_seen_chance: u32,
    /// Last-seen is not rewritten more often than this
    pub last_seen_granularity: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::with_base_dir("pchat_data")
    }
}

impl ServerConfig {
    /// Create config rooted at a custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let data_dir = base_dir.into();
        Self {
            log_dir: data_dir.join("logs"),
            data_dir,
            port: 3001,
            retention: Duration::from_secs(30 * 24 * 60 * 60),
            max_retained: 1000,
            recent_limit: 100,
            expiry_chance: 10,
            last_seen_chance: 10,
            last_seen_granularity: Duration::from_secs(60),
        }
    }

    /// Defaults overridden by `PCHAT_ROOT`, `PCHAT_PORT` and `PCHAT_RETENTION_DAYS`
    pub fn from_env() -> Self {
        let root = std::env::var("PCHAT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("pchat_data"));
        let mut config = Self::with_base_dir(root);

        if let Some(port) = std::env::var("PCHAT_PORT").ok().and_then(|s| s.parse().ok()) {
            config.port = port;
        }
        if let Some(days) = std::env::var("PCHAT_RETENTION_DAYS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.retention = Duration::from_secs(days * 24 * 60 * 60);
        }
        config
    }

    pub fn directory_path(&self) -> PathBuf {
        self.data_dir.join("directory.json")
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        tokio::fs::create_dir_all(&self.log_dir).await?;
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<SyncEndpoint>,
    pub users: Arc<UserStore>,
}
