//! Conversation monitor
//!
//! One per client. Each cycle discovers conversations the user was added to
//! and checks every known conversation for a newer latest timestamp. Results
//! go out on broadcast channels; a subscriber unsubscribes by dropping its
//! receiver.

use pchat_common::ConversationSummary;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::ChatApi;
use crate::known_chats::{KnownChat, KnownChats};

const CHANNEL_CAPACITY: usize = 64;

/// What one cycle produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub discovered: usize,
    pub updated: usize,
}

pub struct ConversationMonitor {
    api: Arc<dyn ChatApi>,
    known: KnownChats,
    interval: Duration,
    new_chats: broadcast::Sender<ConversationSummary>,
    updates: broadcast::Sender<KnownChat>,
}

impl ConversationMonitor {
    pub fn new(api: Arc<dyn ChatApi>, known: KnownChats, interval: Duration) -> Self {
        let (new_chats, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (updates, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            api,
            known,
            interval,
            new_chats,
            updates,
        }
    }

    pub fn known(&self) -> &KnownChats {
        &self.known
    }

    /// One event per newly discovered conversation.
    pub fn subscribe_new_chats(&self) -> broadcast::Receiver<ConversationSummary> {
        self.new_chats.subscribe()
    }

    /// One event per conversation whose latest timestamp advanced.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<KnownChat> {
        self.updates.subscribe()
    }

    /// Discovery, then delta-check over the (possibly grown) known set.
    pub async fn run_cycle(&self) -> CycleReport {
        let discovered = self.discover().await;
        let updated = self.check_deltas().await;
        if discovered > 0 || updated > 0 {
            debug!(
                "[Monitor] cycle: {} new, {} updated",
                discovered, updated
            );
        }
        CycleReport {
            discovered,
            updated,
        }
    }

    async fn discover(&self) -> usize {
        let summaries = match self.api.summary().await {
            Ok(summaries) => summaries,
            Err(e) => {
                warn!("[Monitor] Discovery failed, keeping known set: {}", e);
                return 0;
            }
        };

        let mut discovered = 0;
        for summary in summaries {
            if self.known.insert_if_absent(summary.clone()) {
                info!(
                    "[Monitor] New conversation {} ({})",
                    summary.conversation_id, summary.title
                );
                discovered += 1;
                // No subscribers is fine
                let _ = self.new_chats.send(summary);
            }
        }
        discovered
    }

    async fn check_deltas(&self) -> usize {
        let mut updated = 0;
        for conversation_id in self.known.ids() {
            let latest = match self.api.latest_timestamp(&conversation_id).await {
                Ok(t) => t,
                Err(e) => {
                    warn!("[Monitor] Skipping {} this cycle: {}", conversation_id, e);
                    continue;
                }
            };

            // Forgotten mid-cycle
            let Some(current) = self.known.get(&conversation_id) else {
                continue;
            };
            if latest < current.last_seen_timestamp {
                debug!(
                    "[Monitor] Ignoring older timestamp {} < {} for {}",
                    latest, current.last_seen_timestamp, conversation_id
                );
                continue;
            }

            if let Some(chat) = self.known.advance(&conversation_id, latest) {
                updated += 1;
                let _ = self.updates.send(chat);
            }
        }
        updated
    }

    /// Run cycles on a background task until the handle is stopped or dropped.
    pub fn spawn(self: Arc<Self>) -> MonitorHandle {
        let monitor = self;
        let task = tokio::spawn(async move {
            info!("[Monitor] Started ({:?} interval)", monitor.interval);
            loop {
                monitor.run_cycle().await;
                tokio::time::sleep(monitor.interval).await;
            }
        });
        MonitorHandle { task }
    }
}

/// Owns the monitor task.
pub struct MonitorHandle {
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
