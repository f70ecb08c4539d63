//! Conversation directory
//!
//! Who participates in what, per-user checkpoints, and conversation
//! metadata. Mutations are applied to a copy of the state, persisted, and only
//! then swapped in, so a failed write leaves the directory untouched.

use chrono::{DateTime, Utc};
use pchat_common::{ChatKind, ConversationId, ConversationSummary, PublicRoom, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::{persist, MessageLog};
use crate::users::UserStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ChatKind,
    /// Room name; IMs are titled per viewer
    pub title: String,
    /// The two users of an IM, fixed at creation
    pub im_pair: Option<[UserId; 2]>,
    pub participants: BTreeSet<UserId>,
    pub checkpoints: HashMap<UserId, Timestamp>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    fn new(kind: ChatKind, title: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            title,
            im_pair: None,
            participants: BTreeSet::new(),
            checkpoints: HashMap::new(),
            is_public: false,
            created_at: Utc::now(),
        }
    }

    fn partner_of(&self, user_id: &str) -> Option<&UserId> {
        self.im_pair
            .as_ref()
            .and_then(|pair| pair.iter().find(|u| u.as_str() != user_id))
    }

    pub fn checkpoint_for(&self, user_id: &str) -> Timestamp {
        self.checkpoints.get(user_id).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DirectoryState {
    conversations: HashMap<ConversationId, Conversation>,
    /// "lo|hi" user id pair -> IM
    ims: HashMap<String, ConversationId>,
    /// lowercased room name -> room
    rooms: HashMap<String, ConversationId>,
}

impl DirectoryState {
    fn conversation_mut(&mut self, conversation_id: &str) -> Result<&mut Conversation> {
        self.conversations
            .get_mut(conversation_id)
            .ok_or_else(|| Error::NotFound(format!("conversation {}", conversation_id)))
    }
}

fn im_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}|{}", a, b)
    } else {
        format!("{}|{}", b, a)
    }
}

pub struct ConversationDirectory {
    path: Option<PathBuf>,
    log: Arc<MessageLog>,
    users: Arc<UserStore>,
    state: RwLock<DirectoryState>,
}

impl ConversationDirectory {
    /// Directory persisted at `path`, loading existing state
    pub async fn open(path: PathBuf, log: Arc<MessageLog>, users: Arc<UserStore>) -> Result<Self> {
        let state: DirectoryState = persist::read_json(&path).await?.unwrap_or_default();
        info!(
            "[Directory] Loaded {} conversations from {:?}",
            state.conversations.len(),
            path
        );

        // Every known conversation needs a log, even if its file was lost
        for id in state.conversations.keys() {
            log.register(id).await?;
        }

        Ok(Self {
            path: Some(path),
            log,
            users,
            state: RwLock::new(state),
        })
    }

    pub fn in_memory(log: Arc<MessageLog>, users: Arc<UserStore>) -> Self {
        Self {
            path: None,
            log,
            users,
            state: RwLock::new(DirectoryState::default()),
        }
    }

    async fn commit(&self, current: &mut DirectoryState, next: DirectoryState) -> Result<()> {
        if let Some(path) = &self.path {
            persist::write_json_atomic(path, &next).await?;
        }
        *current = next;
        Ok(())
    }

    async fn summarize(&self, conversation: &Conversation, user_id: &str) -> ConversationSummary {
        let partner_id = conversation.partner_of(user_id).cloned();
        let title = match (&conversation.kind, &partner_id) {
            (ChatKind::Im, Some(partner)) => match self.users.public_profile(partner).await {
                Ok(profile) => profile.username,
                Err(_) => partner.clone(),
            },
            _ => conversation.title.clone(),
        };

        ConversationSummary {
            conversation_id: conversation.id.clone(),
            kind: conversation.kind,
            title,
            partner_id,
            checkpoint: conversation.checkpoint_for(user_id),
        }
    }

    /// Conversations the user currently participates in, oldest first.
    pub async fn open_conversations_for(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let mut mine: Vec<Conversation> = self
            .state
            .read()
            .await
            .conversations
            .values()
            .filter(|c| c.participants.contains(user_id))
            .cloned()
            .collect();
        mine.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut summaries = Vec::with_capacity(mine.len());
        for conversation in &mine {
            summaries.push(self.summarize(conversation, user_id).await);
        }
        Ok(summaries)
    }

    /// Existing IM between the pair, or a new one. Both users end up participating.
    pub async fn start_im(&self, user_a: &str, user_b: &str) -> Result<ConversationId> {
        if user_a == user_b {
            return Err(Error::InvalidArgument("cannot start an IM with yourself".into()));
        }
        self.users.resolve(user_a).await?;
        self.users.resolve(user_b).await?;

        let key = im_key(user_a, user_b);
        let mut state = self.state.write().await;

        if let Some(id) = state.ims.get(&key).cloned() {
            let conversation = state.conversation_mut(&id)?;
            if conversation.participants.contains(user_a) && conversation.participants.contains(user_b) {
                return Ok(id);
            }
            let mut next = state.clone();
            let conversation = next.conversation_mut(&id)?;
            conversation.participants.insert(user_a.to_string());
            conversation.participants.insert(user_b.to_string());
            self.commit(&mut state, next).await?;
            debug!("[Directory] Reopened IM {}", id);
            return Ok(id);
        }

        let mut conversation = Conversation::new(ChatKind::Im, String::new());
        conversation.im_pair = Some([user_a.to_string(), user_b.to_string()]);
        conversation.participants.insert(user_a.to_string());
        conversation.participants.insert(user_b.to_string());
        let id = conversation.id.clone();

        self.log.register(&id).await?;

        let mut next = state.clone();
        next.ims.insert(key, id.clone());
        next.conversations.insert(id.clone(), conversation);
        self.commit(&mut state, next).await?;

        info!("[Directory] Started IM {} between {} and {}", id, user_a, user_b);
        Ok(id)
    }

    /// Join a room by name, creating it on first reference.
    pub async fn join_room(&self, name: &str, is_public: bool, user_id: &str) -> Result<ConversationId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument("room name is empty".into()));
        }
        self.users.resolve(user_id).await?;

        let key = name.to_lowercase();
        let mut state = self.state.write().await;

        if let Some(id) = state.rooms.get(&key).cloned() {
            if state.conversation_mut(&id)?.participants.contains(user_id) {
                return Ok(id);
            }
            let mut next = state.clone();
            next.conversation_mut(&id)?
                .participants
                .insert(user_id.to_string());
            self.commit(&mut state, next).await?;
            debug!("[Directory] {} joined room {}", user_id, id);
            return Ok(id);
        }

        let mut conversation = Conversation::new(ChatKind::Room, name.to_string());
        conversation.is_public = is_public;
        conversation.participants.insert(user_id.to_string());
        let id = conversation.id.clone();

        self.log.register(&id).await?;

        let mut next = state.clone();
        next.rooms.insert(key, id.clone());
        next.conversations.insert(id.clone(), conversation);
        self.commit(&mut state, next).await?;

        info!("[Directory] Created room '{}' ({}) public={}", name, id, is_public);
        Ok(id)
    }

    /// Stop participating. The conversation and its messages stay.
    pub async fn leave(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.conversation_mut(conversation_id)?.participants.contains(user_id) {
            return Ok(());
        }

        let mut next = state.clone();
        next.conversation_mut(conversation_id)?
            .participants
            .remove(user_id);
        self.commit(&mut state, next).await?;

        info!("[Directory] {} left {}", user_id, conversation_id);
        Ok(())
    }

    /// Set the user's checkpoint. Must lie within `0..=latest_timestamp`.
    pub async fn set_checkpoint(
        &self,
        conversation_id: &str,
        user_id: &str,
        timestamp: Timestamp,
    ) -> Result<()> {
        let latest = self.log.latest_timestamp(conversation_id).await?;
        if timestamp < 0 || timestamp > latest {
            return Err(Error::InvalidArgument(format!(
                "checkpoint {} outside 0..={} for {}",
                timestamp, latest, conversation_id
            )));
        }

        let mut state = self.state.write().await;
        let mut next = state.clone();
        next.conversation_mut(conversation_id)?
            .checkpoints
            .insert(user_id.to_string(), timestamp);
        self.commit(&mut state, next).await?;

        debug!(
            "[Directory] checkpoint {} for {} in {}",
            timestamp, user_id, conversation_id
        );
        Ok(())
    }

    pub async fn checkpoint_for(&self, conversation_id: &str, user_id: &str) -> Result<Timestamp> {
        let state = self.state.read().await;
        state
            .conversations
            .get(conversation_id)
            .map(|c| c.checkpoint_for(user_id))
            .ok_or_else(|| Error::NotFound(format!("conversation {}", conversation_id)))
    }

    /// View bootstrap for one conversation the user participates in.
    pub async fn chat_info(&self, user_id: &str, conversation_id: &str) -> Result<ConversationSummary> {
        let conversation = self
            .state
            .read()
            .await
            .conversations
            .get(conversation_id)
            .filter(|c| c.participants.contains(user_id))
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!("{} is not in {}", user_id, conversation_id))
            })?;

        Ok(self.summarize(&conversation, user_id).await)
    }

    pub async fn public_rooms(&self) -> Vec<PublicRoom> {
        let state = self.state.read().await;
        let mut rooms: Vec<PublicRoom> = state
            .conversations
            .values()
            .filter(|c| c.kind == ChatKind::Room && c.is_public)
            .map(|c| PublicRoom {
                conversation_id: c.id.clone(),
                title: c.title.clone(),
                participant_count: c.participants.len(),
            })
            .collect();
        rooms.sort_by(|a, b| a.title.cmp(&b.title));
        rooms
    }
}
