//! Append-only per-conversation message log
//!
//! Each conversation owns an ordered vector of messages guarded by its own
//! lock, persisted as one JSON file under `<root>/logs/`. Timestamps are
//! assigned here, at write time, and are strictly increasing per
//! conversation. Author profiles are joined on the way out and only the
//! public subset is ever returned.

use pchat_common::{ConversationId, Message, Payload, PublicProfile, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::store::persist;
use crate::users::UserStore;

/// What an expiry sweep removes.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Messages older than this are removed
    pub retention: Duration,
    /// Oldest messages beyond this count are removed
    pub max_retained: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(30 * 24 * 60 * 60),
            max_retained: 1000,
        }
    }
}

/// A message as stored: the author is kept by id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMessage {
    user_id: UserId,
    timestamp: Timestamp,
    payload: Payload,
}

/// On-disk and in-memory state of one conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConversationLog {
    conversation_id: ConversationId,
    /// Highest timestamp ever assigned, survives expiry
    high_water: Timestamp,
    messages: Vec<StoredMessage>,
}

impl ConversationLog {
    fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            high_water: 0,
            messages: Vec::new(),
        }
    }
}

pub struct MessageLog {
    dir: Option<PathBuf>,
    users: Arc<UserStore>,
    clock: Arc<dyn Clock>,
    policy: RetentionPolicy,
    logs: RwLock<HashMap<ConversationId, Arc<RwLock<ConversationLog>>>>,
}

impl MessageLog {
    /// Log persisted under `config.log_dir`, loading whatever is already there
    pub async fn open(config: &ServerConfig, users: Arc<UserStore>) -> Result<Self> {
        fs::create_dir_all(&config.log_dir).await?;

        let log = Self {
            dir: Some(config.log_dir.clone()),
            users,
            clock: Arc::new(SystemClock),
            policy: RetentionPolicy {
                retention: config.retention,
                max_retained: config.max_retained,
            },
            logs: RwLock::new(HashMap::new()),
        };
        log.load_existing().await?;
        Ok(log)
    }

    /// Log that lives only in memory
    pub fn in_memory(users: Arc<UserStore>, clock: Arc<dyn Clock>, policy: RetentionPolicy) -> Self {
        Self {
            dir: None,
            users,
            clock,
            policy,
            logs: RwLock::new(HashMap::new()),
        }
    }

    fn log_path(dir: &Path, conversation_id: &str) -> PathBuf {
        dir.join(format!("{}.json", conversation_id))
    }

    async fn load_existing(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let mut entries = fs::read_dir(dir).await?;
        let mut logs = self.logs.write().await;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match persist::read_json::<ConversationLog>(&path).await {
                Ok(Some(log)) => {
                    logs.insert(log.conversation_id.clone(), Arc::new(RwLock::new(log)));
                }
                Ok(None) => {}
                Err(e) => warn!("[MessageLog] Skipping unreadable log {:?}: {}", path, e),
            }
        }

        info!("[MessageLog] Loaded {} conversation logs", logs.len());
        Ok(())
    }

    async fn save(&self, log: &ConversationLog) -> Result<()> {
        if let Some(dir) = &self.dir {
            persist::write_json_atomic(&Self::log_path(dir, &log.conversation_id), log).await?;
        }
        Ok(())
    }

    async fn get(&self, conversation_id: &str) -> Result<Arc<RwLock<ConversationLog>>> {
        self.logs
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("conversation {}", conversation_id)))
    }

    /// Create an empty log for a new conversation. Idempotent.
    pub async fn register(&self, conversation_id: &str) -> Result<()> {
        let mut logs = self.logs.write().await;
        if logs.contains_key(conversation_id) {
            return Ok(());
        }

        let log = ConversationLog::new(conversation_id);
        self.save(&log).await?;
        logs.insert(conversation_id.to_string(), Arc::new(RwLock::new(log)));
        debug!("[MessageLog] Registered {}", conversation_id);
        Ok(())
    }

    /// Append a message and return its server-assigned timestamp.
    pub async fn append(
        &self,
        conversation_id: &str,
        author_id: &str,
        payload: Payload,
    ) -> Result<Timestamp> {
        if payload.is_empty() {
            return Err(Error::InvalidArgument("empty message payload".into()));
        }
        // Author must exist before anything is written
        self.users.resolve(author_id).await?;

        let log_lock = self.get(conversation_id).await?;
        let mut log = log_lock.write().await;

        let timestamp = self.clock.now_ms().max(log.high_water + 1);
        let previous_high_water = log.high_water;
        log.messages.push(StoredMessage {
            user_id: author_id.to_string(),
            timestamp,
            payload,
        });
        log.high_water = timestamp;

        if let Err(e) = self.save(&log).await {
            log.messages.pop();
            log.high_water = previous_high_water;
            return Err(e);
        }

        debug!(
            "[MessageLog] {} appended to {} at {}",
            author_id, conversation_id, timestamp
        );
        Ok(timestamp)
    }

    /// All messages after `after`, oldest first.
    pub async fn since(&self, conversation_id: &str, after: Timestamp) -> Result<Vec<Message>> {
        let stored: Vec<StoredMessage> = {
            let log_lock = self.get(conversation_id).await?;
            let log = log_lock.read().await;
            // Ascending by construction, so everything after the partition point
            let start = log.messages.partition_point(|m| m.timestamp <= after);
            log.messages[start..].to_vec()
        };

        Ok(self.redact(conversation_id, stored).await)
    }

    /// The newest `limit` messages after `checkpoint`, oldest first.
    pub async fn recent(
        &self,
        conversation_id: &str,
        checkpoint: Timestamp,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let mut stored: Vec<StoredMessage> = {
            let log_lock = self.get(conversation_id).await?;
            let log = log_lock.read().await;
            log.messages
                .iter()
                .rev()
                .take_while(|m| m.timestamp > checkpoint)
                .take(limit)
                .cloned()
                .collect()
        };
        // Collected newest first; callers always get chronological order
        stored.reverse();

        Ok(self.redact(conversation_id, stored).await)
    }

    /// Highest timestamp ever assigned in the conversation, 0 if none.
    pub async fn latest_timestamp(&self, conversation_id: &str) -> Result<Timestamp> {
        let log_lock = self.get(conversation_id).await?;
        let log = log_lock.read().await;
        Ok(log.high_water)
    }

    /// Remove messages outside the retention policy. Returns how many went.
    pub async fn expire(&self, conversation_id: &str) -> Result<usize> {
        let log_lock = self.get(conversation_id).await?;
        let mut log = log_lock.write().await;

        let cutoff = self.clock.now_ms() - self.policy.retention.as_millis() as i64;
        let original = log.messages.clone();

        let too_old = log.messages.partition_point(|m| m.timestamp < cutoff);
        log.messages.drain(..too_old);
        let surplus = log.messages.len().saturating_sub(self.policy.max_retained);
        log.messages.drain(..surplus);

        let removed = original.len() - log.messages.len();
        if removed == 0 {
            return Ok(0);
        }

        if let Err(e) = self.save(&log).await {
            // The sweep is all-or-nothing
            log.messages = original;
            return Err(e);
        }

        info!(
            "[MessageLog] Expired {} messages from {}",
            removed, conversation_id
        );
        Ok(removed)
    }

    async fn redact(&self, conversation_id: &str, stored: Vec<StoredMessage>) -> Vec<Message> {
        let mut ids: Vec<&str> = stored.iter().map(|m| m.user_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        let profiles = self.users.public_profiles(&ids).await;

        stored
            .into_iter()
            .map(|m| {
                let user = profiles.get(&m.user_id).cloned().unwrap_or_else(|| PublicProfile {
                    user_id: m.user_id.clone(),
                    username: "[unknown]".to_string(),
                    profile_image: None,
                });
                Message {
                    conversation_id: conversation_id.to_string(),
                    user_id: m.user_id,
                    timestamp: m.timestamp,
                    payload: m.payload,
                    user,
                }
            })
            .collect()
    }
}
