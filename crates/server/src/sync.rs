//! Sync endpoint
//!
//! The query surface clients poll: summary, recent, since, latest timestamp,
//! post, leave and checkpoint, plus the IM/room entry points. Each operation
//! is a single call against the log or the directory. Failures are logged
//! here with their cause; callers only learn the error kind.

use pchat_common::{
    ConversationId, ConversationSummary, LastSeen, Message, Payload, PostRequest, PublicRoom,
    Timestamp,
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::store::{ConversationDirectory, MessageLog};
use crate::users::UserStore;

/// How often an opportunistic side job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chance {
    Never,
    Always,
    /// Runs with probability 1 / n
    OneIn(u32),
}

impl Chance {
    pub fn roll(&self) -> bool {
        match *self {
            Chance::Never => false,
            Chance::Always => true,
            Chance::OneIn(0) | Chance::OneIn(1) => true,
            Chance::OneIn(n) => rand::thread_rng().gen_range(0..n) == 0,
        }
    }
}

/// Side jobs piggybacked on ordinary requests instead of a background task.
#[derive(Debug, Clone, Copy)]
pub struct MaintenancePolicy {
    /// Expiry sweep after a successful post
    pub expiry: Chance,
    /// Last-seen refresh on a since-fetch (recent always refreshes)
    pub last_seen: Chance,
    pub last_seen_granularity: Duration,
}

impl Default for MaintenancePolicy {
    fn default() -> Self {
        Self {
            expiry: Chance::OneIn(10),
            last_seen: Chance::OneIn(10),
            last_seen_granularity: Duration::from_secs(60),
        }
    }
}

impl MaintenancePolicy {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            expiry: Chance::OneIn(config.expiry_chance),
            last_seen: Chance::OneIn(config.last_seen_chance),
            last_seen_granularity: config.last_seen_granularity,
        }
    }
}

fn logged<T>(op: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        match e {
            Error::Transient(_) => error!("[Sync] {} failed: {}", op, e),
            _ => warn!("[Sync] {} rejected: {}", op, e),
        }
    }
    result
}

/// The operations behind the HTTP routes. Reads and posts take any existing
/// conversation id; membership is only checked by `chat_info`.
pub struct SyncEndpoint {
    log: Arc<MessageLog>,
    directory: Arc<ConversationDirectory>,
    users: Arc<UserStore>,
    recent_limit: usize,
    maintenance: MaintenancePolicy,
}

impl SyncEndpoint {
    pub fn new(
        log: Arc<MessageLog>,
        directory: Arc<ConversationDirectory>,
        users: Arc<UserStore>,
    ) -> Self {
        Self {
            log,
            directory,
            users,
            recent_limit: 100,
            maintenance: MaintenancePolicy::default(),
        }
    }

    /// Open the persisted stores under `config.data_dir`.
    pub async fn open(config: &ServerConfig, users: Arc<UserStore>) -> Result<Self> {
        let log = Arc::new(MessageLog::open(config, users.clone()).await?);
        let directory = Arc::new(
            ConversationDirectory::open(config.directory_path(), log.clone(), users.clone())
                .await?,
        );

        Ok(Self::new(log, directory, users)
            .with_recent_limit(config.recent_limit)
            .with_maintenance(MaintenancePolicy::from_config(config)))
    }

    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    pub fn with_maintenance(mut self, maintenance: MaintenancePolicy) -> Self {
        self.maintenance = maintenance;
        self
    }

    pub fn directory(&self) -> &Arc<ConversationDirectory> {
        &self.directory
    }

    async fn touch_last_seen(&self, user_id: &str) {
        if let Err(e) = self
            .users
            .touch_last_seen(user_id, self.maintenance.last_seen_granularity)
            .await
        {
            warn!("[Sync] Unable to update last seen for {}: {}", user_id, e);
        }
    }

    pub async fn summary(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        logged("summary", self.directory.open_conversations_for(user_id).await)
    }

    /// Newest messages after the caller's checkpoint, chronological.
    pub async fn recent(&self, user_id: &str, conversation_id: &str) -> Result<Vec<Message>> {
        let result: Result<Vec<Message>> = async {
            let checkpoint = self.directory.checkpoint_for(conversation_id, user_id).await?;
            self.log
                .recent(conversation_id, checkpoint, self.recent_limit)
                .await
        }
        .await;
        let messages = logged("recent", result)?;

        // Infrequent call, so always worth refreshing presence
        self.touch_last_seen(user_id).await;
        Ok(messages)
    }

    pub async fn since(
        &self,
        user_id: &str,
        conversation_id: &str,
        after: Timestamp,
    ) -> Result<Vec<Message>> {
        let messages = logged("since", self.log.since(conversation_id, after).await)?;

        if self.maintenance.last_seen.roll() {
            self.touch_last_seen(user_id).await;
        }
        Ok(messages)
    }

    pub async fn latest_timestamp(&self, conversation_id: &str) -> Result<Timestamp> {
        logged("timestamp", self.log.latest_timestamp(conversation_id).await)
    }

    pub async fn post_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        text: String,
    ) -> Result<Timestamp> {
        self.post_payload(user_id, conversation_id, Payload::Text(text))
            .await
    }

    pub async fn post_media(
        &self,
        user_id: &str,
        conversation_id: &str,
        media: String,
    ) -> Result<Timestamp> {
        self.post_payload(user_id, conversation_id, Payload::Media(media))
            .await
    }

    /// Text wins when a request carries both; neither is rejected.
    pub async fn post(&self, user_id: &str, request: PostRequest) -> Result<Timestamp> {
        match (request.chat_text, request.media) {
            (Some(text), _) => self.post_message(user_id, &request.conversation_id, text).await,
            (None, Some(media)) => self.post_media(user_id, &request.conversation_id, media).await,
            (None, None) => logged(
                "post",
                Err(Error::InvalidArgument("post without text or media".into())),
            ),
        }
    }

    async fn post_payload(
        &self,
        user_id: &str,
        conversation_id: &str,
        payload: Payload,
    ) -> Result<Timestamp> {
        let timestamp = logged(
            "post",
            self.log.append(conversation_id, user_id, payload).await,
        )?;

        if self.maintenance.expiry.roll() {
            // The post already succeeded; a failed sweep is only logged
            if let Err(e) = self.log.expire(conversation_id).await {
                error!("[Sync] Expiry sweep for {} failed: {}", conversation_id, e);
            }
        }
        Ok(timestamp)
    }

    pub async fn leave(&self, user_id: &str, conversation_id: &str) -> Result<()> {
        logged("leave", self.directory.leave(conversation_id, user_id).await)
    }

    pub async fn set_checkpoint(
        &self,
        user_id: &str,
        conversation_id: &str,
        checkpoint: Timestamp,
    ) -> Result<()> {
        logged(
            "checkpoint",
            self.directory
                .set_checkpoint(conversation_id, user_id, checkpoint)
                .await,
        )
    }

    /// Start (or reopen) an IM with the user called `partner_name`.
    pub async fn start_im(&self, user_id: &str, partner_name: &str) -> Result<ConversationId> {
        let result: Result<ConversationId> = async {
            let partner = self.users.find_by_name(partner_name).await?;
            self.directory.start_im(user_id, &partner.id).await
        }
        .await;
        let id = logged("start_im", result)?;
        info!("[Sync] {} opened IM {} with {}", user_id, id, partner_name);
        Ok(id)
    }

    pub async fn join_room(
        &self,
        user_id: &str,
        name: &str,
        is_public: bool,
    ) -> Result<ConversationId> {
        logged(
            "join_room",
            self.directory.join_room(name, is_public, user_id).await,
        )
    }

    /// Join a public room by name, or go straight in if already there.
    pub async fn try_room(&self, user_id: &str, name: &str) -> Result<ConversationId> {
        self.join_room(user_id, name, true).await
    }

    pub async fn public_rooms(&self) -> Vec<PublicRoom> {
        self.directory.public_rooms().await
    }

    pub async fn chat_info(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<ConversationSummary> {
        logged(
            "chat_info",
            self.directory.chat_info(user_id, conversation_id).await,
        )
    }

    /// Presence lookup for a partner.
    pub async fn last_seen(&self, user_id: &str) -> Result<LastSeen> {
        logged("last_seen", self.users.last_seen(user_id).await)
    }
}
