//! Server access for monitors and sessions.
//!
//! [`ChatApi`] is the seam: [`HttpChatApi`] talks to a running server, tests
//! plug in an in-process implementation. An implementation acts on behalf of
//! one user.

use async_trait::async_trait;
use pchat_common::{
    CheckpointRequest, ConversationSummary, LastSeen, LeaveRequest, Message, PostRequest,
    PostResponse, StatusResponse, Timestamp, TimestampResponse,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Header carrying the caller's identity.
pub const USER_HEADER: &str = "x-user";

#[async_trait]
pub trait ChatApi: Send + Sync + 'static {
    /// The caller's open conversations.
    async fn summary(&self) -> Result<Vec<ConversationSummary>>;

    /// Title, kind, partner and checkpoint of one conversation.
    async fn chat_info(&self, conversation_id: &str) -> Result<ConversationSummary>;

    async fn recent(&self, conversation_id: &str) -> Result<Vec<Message>>;

    async fn since(&self, conversation_id: &str, after: Timestamp) -> Result<Vec<Message>>;

    async fn latest_timestamp(&self, conversation_id: &str) -> Result<Timestamp>;

    /// Returns the server-assigned timestamp.
    async fn post_text(&self, conversation_id: &str, text: &str) -> Result<Timestamp>;

    async fn post_media(&self, conversation_id: &str, media: &str) -> Result<Timestamp>;

    async fn leave(&self, conversation_id: &str) -> Result<()>;

    async fn set_checkpoint(&self, conversation_id: &str, checkpoint: Timestamp) -> Result<()>;

    async fn last_seen(&self, user_id: &str) -> Result<LastSeen>;
}

/// [`ChatApi`] over the server's JSON routes.
#[derive(Clone)]
pub struct HttpChatApi {
    client: Client,
    base_url: String,
    user_id: String,
}

impl HttpChatApi {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Transient(e.to_string()))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_id: config.user_id.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("GET {}", path);
        let response = self
            .client
            .get(self.url(path))
            .header(USER_HEADER, &self.user_id)
            .send()
            .await?;
        Self::decode(response, path).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        debug!("POST {}", path);
        let response = self
            .client
            .post(self.url(path))
            .header(USER_HEADER, &self.user_id)
            .json(body)
            .send()
            .await?;
        Self::decode(response, path).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response, path: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::from_status(status.as_u16(), path));
        }
        Ok(response.json::<T>().await?)
    }

    async fn post(&self, request: PostRequest) -> Result<Timestamp> {
        let response: PostResponse = self.post_json("/chat/add", &request).await?;
        Ok(response.timestamp)
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn summary(&self) -> Result<Vec<ConversationSummary>> {
        self.get_json("/chat/summary").await
    }

    async fn chat_info(&self, conversation_id: &str) -> Result<ConversationSummary> {
        self.get_json(&format!("/chat/info/{}", conversation_id))
            .await
    }

    async fn recent(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.get_json(&format!("/chat/recent/{}", conversation_id))
            .await
    }

    async fn since(&self, conversation_id: &str, after: Timestamp) -> Result<Vec<Message>> {
        self.get_json(&format!("/chat/since/{}/{}", conversation_id, after))
            .await
    }

    async fn latest_timestamp(&self, conversation_id: &str) -> Result<Timestamp> {
        let response: TimestampResponse = self
            .get_json(&format!("/chat/timestamp/{}", conversation_id))
            .await?;
        Ok(response.timestamp)
    }

    async fn post_text(&self, conversation_id: &str, text: &str) -> Result<Timestamp> {
        self.post(PostRequest {
            conversation_id: conversation_id.to_string(),
            chat_text: Some(text.to_string()),
            media: None,
        })
        .await
    }

    async fn post_media(&self, conversation_id: &str, media: &str) -> Result<Timestamp> {
        self.post(PostRequest {
            conversation_id: conversation_id.to_string(),
            chat_text: None,
            media: Some(media.to_string()),
        })
        .await
    }

    async fn leave(&self, conversation_id: &str) -> Result<()> {
        let _: StatusResponse = self
            .post_json(
                "/chat/leave",
                &LeaveRequest {
                    conversation_id: conversation_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn set_checkpoint(&self, conversation_id: &str, checkpoint: Timestamp) -> Result<()> {
        let _: StatusResponse = self
            .post_json(
                "/chat/checkpoint",
                &CheckpointRequest {
                    conversation_id: conversation_id.to_string(),
                    checkpoint,
                },
            )
            .await?;
        Ok(())
    }

    async fn last_seen(&self, user_id: &str) -> Result<LastSeen> {
        self.get_json(&format!("/user/lastseen/{}", user_id)).await
    }
}
