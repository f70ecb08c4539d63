#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pchat_client::{ChatApi, ClientError, ClientConfig, Result};
use pchat_common::{ConversationSummary, LastSeen, Message, Timestamp};
use pchat_server::clock::SystemClock;
use pchat_server::store::{ConversationDirectory, MessageLog, RetentionPolicy};
use pchat_server::sync::{Chance, MaintenancePolicy, SyncEndpoint};
use pchat_server::users::{UserRecord, UserStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-process [`ChatApi`] acting as one user against a real endpoint.
pub struct LocalApi {
    pub sync: Arc<SyncEndpoint>,
    pub user_id: String,
    pub fail_posts: AtomicBool,
    pub fail_summary: AtomicBool,
    pub fail_since: AtomicBool,
    /// Leave this user's own messages out of `since` results
    pub hide_own_since: AtomicBool,
    pub latest_override: Mutex<Option<Timestamp>>,
}

impl LocalApi {
    pub fn new(sync: Arc<SyncEndpoint>, user_id: &str) -> Arc<Self> {
        Arc::new(Self {
            sync,
            user_id: user_id.to_string(),
            fail_posts: AtomicBool::new(false),
            fail_summary: AtomicBool::new(false),
            fail_since: AtomicBool::new(false),
            hide_own_since: AtomicBool::new(false),
            latest_override: Mutex::new(None),
        })
    }
}

fn map(err: pchat_server::Error) -> ClientError {
    match err {
        pchat_server::Error::NotFound(m) => ClientError::NotFound(m),
        pchat_server::Error::InvalidArgument(m) => ClientError::InvalidArgument(m),
        other => ClientError::Transient(other.to_string()),
    }
}

#[async_trait]
impl ChatApi for LocalApi {
    async fn summary(&self) -> Result<Vec<ConversationSummary>> {
        if self.fail_summary.load(Ordering::SeqCst) {
            return Err(ClientError::Transient("summary unavailable".into()));
        }
        self.sync.summary(&self.user_id).await.map_err(map)
    }

    async fn chat_info(&self, conversation_id: &str) -> Result<ConversationSummary> {
        self.sync
            .chat_info(&self.user_id, conversation_id)
            .await
            .map_err(map)
    }

    async fn recent(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.sync
            .recent(&self.user_id, conversation_id)
            .await
            .map_err(map)
    }

    async fn since(&self, conversation_id: &str, after: Timestamp) -> Result<Vec<Message>> {
        if self.fail_since.load(Ordering::SeqCst) {
            return Err(ClientError::Transient("timed out".into()));
        }
        let mut messages = self
            .sync
            .since(&self.user_id, conversation_id, after)
            .await
            .map_err(map)?;
        if self.hide_own_since.load(Ordering::SeqCst) {
            messages.retain(|m| m.user_id != self.user_id);
        }
        Ok(messages)
    }

    async fn latest_timestamp(&self, conversation_id: &str) -> Result<Timestamp> {
        if let Some(t) = *self.latest_override.lock() {
            return Ok(t);
        }
        self.sync.latest_timestamp(conversation_id).await.map_err(map)
    }

    async fn post_text(&self, conversation_id: &str, text: &str) -> Result<Timestamp> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(ClientError::Transient("connection reset".into()));
        }
        self.sync
            .post_message(&self.user_id, conversation_id, text.to_string())
            .await
            .map_err(map)
    }

    async fn post_media(&self, conversation_id: &str, media: &str) -> Result<Timestamp> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(ClientError::Transient("connection reset".into()));
        }
        self.sync
            .post_media(&self.user_id, conversation_id, media.to_string())
            .await
            .map_err(map)
    }

    async fn leave(&self, conversation_id: &str) -> Result<()> {
        self.sync
            .leave(&self.user_id, conversation_id)
            .await
            .map_err(map)
    }

    async fn set_checkpoint(&self, conversation_id: &str, checkpoint: Timestamp) -> Result<()> {
        self.sync
            .set_checkpoint(&self.user_id, conversation_id, checkpoint)
            .await
            .map_err(map)
    }

    async fn last_seen(&self, user_id: &str) -> Result<LastSeen> {
        self.sync.last_seen(user_id).await.map_err(map)
    }
}

pub struct World {
    pub sync: Arc<SyncEndpoint>,
    pub alice: UserRecord,
    pub bob: UserRecord,
}

impl World {
    pub async fn new() -> Self {
        let users = Arc::new(UserStore::in_memory());
        let alice = users.upsert(UserRecord::new("alice")).await.unwrap();
        let bob = users.upsert(UserRecord::new("bob")).await.unwrap();

        let log = Arc::new(MessageLog::in_memory(
            users.clone(),
            Arc::new(SystemClock),
            RetentionPolicy::default(),
        ));
        let directory = Arc::new(ConversationDirectory::in_memory(log.clone(), users.clone()));
        let sync = SyncEndpoint::new(log, directory, users).with_maintenance(MaintenancePolicy {
            expiry: Chance::Never,
            last_seen: Chance::Never,
            last_seen_granularity: Duration::from_secs(60),
        });

        Self {
            sync: Arc::new(sync),
            alice,
            bob,
        }
    }

    pub fn api(&self, user: &UserRecord) -> Arc<LocalApi> {
        LocalApi::new(self.sync.clone(), &user.id)
    }

    pub fn config(&self, user: &UserRecord) -> ClientConfig {
        ClientConfig::for_user(&user.id)
    }

    pub async fn bob_says(&self, conversation_id: &str, text: &str) -> Timestamp {
        self.sync
            .post_message(&self.bob.id, conversation_id, text.to_string())
            .await
            .unwrap()
    }
}
