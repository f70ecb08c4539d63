//! User records and last-seen tracking
//!
//! Authentication itself lives elsewhere; this store only answers "who is
//! this id" for profile denormalization and the presence lookup. Records are
//! seeded from `<root>/users.json` when present.

use chrono::Utc;
use pchat_common::{LastSeen, PublicProfile, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::persist;

/// Full user record. Only [`UserRecord::public`] may leave the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub salt: Option<String>,
    pub profile_image: Option<String>,
    #[serde(default)]
    pub last_seen: Timestamp,
}

impl UserRecord {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username: username.into(),
            email: None,
            password_hash: None,
            salt: None,
            profile_image: None,
            last_seen: 0,
        }
    }

    /// Strip everything private.
    pub fn public(&self) -> PublicProfile {
        PublicProfile {
            user_id: self.id.clone(),
            username: self.username.clone(),
            profile_image: self.profile_image.clone(),
        }
    }
}

pub struct UserStore {
    path: Option<PathBuf>,
    users: RwLock<HashMap<UserId, UserRecord>>,
}

impl UserStore {
    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Load from `path` if it exists; later inserts are written back there.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let records: Vec<UserRecord> = persist::read_json(&path).await?.unwrap_or_default();
        info!("[Users] Loaded {} users from {:?}", records.len(), path);

        let users = records.into_iter().map(|u| (u.id.clone(), u)).collect();
        Ok(Self {
            path: Some(path),
            users: RwLock::new(users),
        })
    }

    async fn save(&self, users: &HashMap<UserId, UserRecord>) -> Result<()> {
        if let Some(path) = &self.path {
            let mut records: Vec<&UserRecord> = users.values().collect();
            records.sort_by(|a, b| a.username.cmp(&b.username));
            persist::write_json_atomic(path, &records).await?;
        }
        Ok(())
    }

    /// Insert or replace a record
    pub async fn upsert(&self, record: UserRecord) -> Result<UserRecord> {
        let mut users = self.users.write().await;
        users.insert(record.id.clone(), record.clone());
        self.save(&users).await?;
        Ok(record)
    }

    pub async fn resolve(&self, user_id: &str) -> Result<UserRecord> {
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("user {}", user_id)))
    }

    pub async fn find_by_name(&self, username: &str) -> Result<UserRecord> {
        self.users
            .read()
            .await
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("username {}", username)))
    }

    pub async fn public_profile(&self, user_id: &str) -> Result<PublicProfile> {
        Ok(self.resolve(user_id).await?.public())
    }

    /// Bulk profile lookup; unknown ids are simply absent from the result.
    pub async fn public_profiles(&self, ids: &[&str]) -> HashMap<UserId, PublicProfile> {
        let users = self.users.read().await;
        ids.iter()
            .filter_map(|id| users.get(*id).map(|u| (u.id.clone(), u.public())))
            .collect()
    }

    pub async fn last_seen(&self, user_id: &str) -> Result<LastSeen> {
        let user = self.resolve(user_id).await?;
        Ok(LastSeen {
            user_id: user.id,
            name: user.username,
            last_seen: user.last_seen,
        })
    }

    /// Set last-seen to now unless it was set within `granularity`.
    ///
    /// Returns whether the record changed.
    pub async fn touch_last_seen(&self, user_id: &str, granularity: Duration) -> Result<bool> {
        let now = Utc::now().timestamp_millis();
        let mut users = self.users.write().await;
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFound(format!("user {}", user_id)))?;

        if now - user.last_seen < granularity.as_millis() as i64 {
            return Ok(false);
        }
        user.last_seen = now;
        debug!("[Users] last_seen for {} -> {}", user_id, now);

        self.save(&users).await?;
        Ok(true)
    }
}
