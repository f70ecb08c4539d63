//! Sync session
//!
//! One per open conversation view. Drives the fetch-since loop, echoes the
//! user's own text optimistically and reconciles it with the server copy,
//! keeps the displayed window bounded, and reports partner presence for IMs.
//!
//! A tick is `Idle -> Fetching -> Reconciling -> Idle`. Ticks never overlap:
//! the fetch guard serializes them and the loop only re-arms after a tick
//! completes.

use parking_lot::Mutex;
use pchat_common::{now_ms, ChatKind, ConversationSummary, Payload, Timestamp};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::api::ChatApi;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::known_chats::KnownChats;
use crate::monitor::ConversationMonitor;
use crate::presence::{status_line, PresenceTracker};
use crate::window::{AckOutcome, ChatWindow, Entry};

pub const SEND_FAILED: &str = "Message failed to send";
pub const UNCONFIRMED: &str = "A sent message could not be confirmed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Fetching,
    Reconciling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Entries were added, replaced or removed
    WindowChanged,
    /// A user-visible line that is not a message
    Status(String),
}

struct SessionState {
    phase: SessionPhase,
    window: ChatWindow,
    presence: PresenceTracker,
}

pub struct SyncSession {
    api: Arc<dyn ChatApi>,
    config: ClientConfig,
    info: ConversationSummary,
    known: KnownChats,
    state: Mutex<SessionState>,
    fetch_guard: tokio::sync::Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
    trigger: Notify,
    task: Mutex<Option<AbortHandle>>,
}

impl SyncSession {
    /// Bootstrap a view: load the newest messages after the user's
    /// checkpoint. The first presence sample is taken when polling starts.
    pub async fn open(
        api: Arc<dyn ChatApi>,
        config: ClientConfig,
        conversation_id: &str,
        known: KnownChats,
    ) -> Result<Arc<Self>> {
        let info = api.chat_info(conversation_id).await?;
        let recent = api.recent(conversation_id).await?;

        let mut window = ChatWindow::new(conversation_id, config.display_cap);
        window.raise_checkpoint(info.checkpoint);
        window.ingest(recent);
        window.raise_last_known(info.checkpoint);
        window.prune();

        let (events, _) = broadcast::channel(256);
        let presence = PresenceTracker::new(config.idle_threshold, config.presence_interval);
        known.insert_if_absent(info.clone());

        info!(
            "[Session] Opened {} ({}) at {}",
            conversation_id,
            info.title,
            window.last_known()
        );

        let session = Arc::new(Self {
            api,
            config,
            info,
            known,
            state: Mutex::new(SessionState {
                phase: SessionPhase::Idle,
                window,
                presence,
            }),
            fetch_guard: tokio::sync::Mutex::new(()),
            events,
            trigger: Notify::new(),
            task: Mutex::new(None),
        });

        Ok(session)
    }

    pub fn conversation_id(&self) -> &str {
        &self.info.conversation_id
    }

    pub fn info(&self) -> &ConversationSummary {
        &self.info
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.state.lock().window.entries().to_vec()
    }

    pub fn last_known(&self) -> Timestamp {
        self.state.lock().window.last_known()
    }

    pub fn checkpoint(&self) -> Timestamp {
        self.state.lock().window.checkpoint()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn status(&self, line: impl Into<String>) {
        self.emit(SessionEvent::Status(line.into()));
    }

    /// One fetch-since round trip and reconciliation. Returns how many
    /// entries were added or replaced.
    pub async fn fetch_once(&self) -> Result<usize> {
        let _guard = self.fetch_guard.lock().await;

        let after = {
            let mut state = self.state.lock();
            state.phase = SessionPhase::Fetching;
            state.window.last_known()
        };

        let messages = match self.api.since(self.conversation_id(), after).await {
            Ok(messages) => messages,
            Err(e) => {
                self.state.lock().phase = SessionPhase::Idle;
                return Err(e);
            }
        };

        let (report, orphaned, pruned) = {
            let mut state = self.state.lock();
            state.phase = SessionPhase::Reconciling;
            let report = state.window.ingest(messages);
            let orphaned = state.window.mark_orphans();
            let pruned = state.window.prune();
            state.phase = SessionPhase::Idle;
            (report, orphaned, pruned)
        };

        if report.changed() || pruned > 0 {
            debug!(
                "[Session] {}: +{} ~{} -{}",
                self.conversation_id(),
                report.added,
                report.replaced,
                pruned
            );
            self.emit(SessionEvent::WindowChanged);
        }
        if orphaned > 0 {
            warn!(
                "[Session] {} acknowledged message(s) in {} never arrived",
                orphaned,
                self.conversation_id()
            );
            self.status(UNCONFIRMED);
        }
        Ok(report.added + report.replaced)
    }

    /// Post text, echoing it immediately.
    pub async fn send_text(&self, text: &str) -> Result<Timestamp> {
        if text.trim().is_empty() {
            return Err(ClientError::InvalidArgument("empty message".into()));
        }

        let key = self.state.lock().window.echo(
            &self.config.user_id,
            Payload::Text(text.to_string()),
            now_ms(),
        );
        self.emit(SessionEvent::WindowChanged);

        match self.api.post_text(self.conversation_id(), text).await {
            Ok(timestamp) => {
                let outcome = self.state.lock().window.ack(&key, timestamp);
                match outcome {
                    AckOutcome::AwaitingFetch => self.trigger.notify_one(),
                    AckOutcome::AlreadyConfirmed => self.emit(SessionEvent::WindowChanged),
                    AckOutcome::Missing => {}
                }
                Ok(timestamp)
            }
            Err(e) => {
                warn!("[Session] Post to {} failed: {}", self.conversation_id(), e);
                self.state.lock().window.discard(&key);
                self.emit(SessionEvent::WindowChanged);
                self.status(SEND_FAILED);
                Err(e)
            }
        }
    }

    /// Post a media reference. Not echoed; it shows up on the next fetch.
    pub async fn send_media(&self, media: &str) -> Result<Timestamp> {
        match self.api.post_media(self.conversation_id(), media).await {
            Ok(timestamp) => {
                self.trigger.notify_one();
                Ok(timestamp)
            }
            Err(e) => {
                warn!("[Session] Media post to {} failed: {}", self.conversation_id(), e);
                self.status(SEND_FAILED);
                Err(e)
            }
        }
    }

    /// Hide everything shown so far, for this and future views.
    pub async fn clear(&self) -> Result<()> {
        let checkpoint = self.state.lock().window.clear();
        self.emit(SessionEvent::WindowChanged);
        info!(
            "[Session] Cleared {} up to {}",
            self.conversation_id(),
            checkpoint
        );
        self.api
            .set_checkpoint(self.conversation_id(), checkpoint)
            .await
    }

    /// Leave the conversation and stop polling it.
    pub async fn leave(&self) -> Result<()> {
        self.api.leave(self.conversation_id()).await?;
        self.stop();
        self.known.forget(self.conversation_id());
        info!("[Session] Left {}", self.conversation_id());
        Ok(())
    }

    /// Sample partner presence if due (IMs only).
    pub async fn refresh_presence(&self, force: bool) {
        if self.info.kind != ChatKind::Im {
            return;
        }
        let Some(partner_id) = self.info.partner_id.as_deref() else {
            return;
        };
        if !self.state.lock().presence.due(now_ms(), force) {
            return;
        }

        let sample = match self.api.last_seen(partner_id).await {
            Ok(sample) => sample,
            Err(e) => {
                debug!("[Session] Presence lookup for {} failed: {}", partner_id, e);
                return;
            }
        };

        let now = now_ms();
        let report = self
            .state
            .lock()
            .presence
            .observe(sample.last_seen, now, force);
        if let Some(report) = report {
            self.status(status_line(&sample.name, &report, now));
        }
    }

    async fn tick(&self) {
        if let Err(e) = self.fetch_once().await {
            warn!("[Session] Fetch for {} failed: {}", self.conversation_id(), e);
        }
        self.refresh_presence(false).await;
    }

    /// Start polling, beginning with a forced presence sample. Stopping the
    /// handle, dropping it, or leaving the conversation ends the loop.
    pub fn spawn(self: &Arc<Self>) -> SessionHandle {
        let session = Arc::clone(self);
        let task = tokio::spawn(async move {
            session.refresh_presence(true).await;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(session.config.poll_interval) => {}
                    _ = session.trigger.notified() => {}
                }
                session.tick().await;
            }
        });

        *self.task.lock() = Some(task.abort_handle());
        SessionHandle { task }
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    /// Surface monitor events for other conversations as status lines.
    pub fn attach(self: &Arc<Self>, monitor: &ConversationMonitor) -> SessionHandle {
        let mut new_chats = monitor.subscribe_new_chats();
        let mut updates = monitor.subscribe_updates();
        let session = Arc::clone(self);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    chat = new_chats.recv() => match chat {
                        Ok(chat) => session.status(format!("New chat started: {}", chat.title)),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    update = updates.recv() => match update {
                        Ok(chat) if chat.summary.conversation_id != session.conversation_id() => {
                            session.status(format!("New message in {}", chat.summary.title));
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        SessionHandle { task }
    }
}

/// Owns a session task; aborts it on `stop()` or drop.
pub struct SessionHandle {
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
