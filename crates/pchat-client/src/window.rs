//! The displayed working set of one conversation.
//!
//! Entries are keyed by [`MessageKey`]. An optimistic echo starts `Pending`
//! under a provisional timestamp, becomes `Acknowledged` once the server
//! returns its real timestamp, and is replaced in place by the confirmed
//! copy when a fetch delivers it. A confirmed key is never inserted twice.

use pchat_common::{Message, MessageKey, Payload, PublicProfile, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Local echo, post not yet acknowledged
    Pending,
    /// Local echo re-keyed to the server timestamp, awaiting its fetch
    Acknowledged,
    Confirmed,
    /// Acknowledged echo that fetching passed without confirming
    Orphaned,
}

impl EntryState {
    fn is_echo(self) -> bool {
        !matches!(self, EntryState::Confirmed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: MessageKey,
    pub state: EntryState,
    pub payload: Payload,
    /// Unknown for local echoes
    pub author: Option<PublicProfile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The confirmed copy was already displayed; the echo is gone
    AlreadyConfirmed,
    /// The echo now carries the server timestamp; fetch to confirm it
    AwaitingFetch,
    /// No echo under that key (cleared or replaced meanwhile)
    Missing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub added: usize,
    pub replaced: usize,
    pub skipped: usize,
}

impl IngestReport {
    pub fn changed(&self) -> bool {
        self.added > 0 || self.replaced > 0
    }
}

#[derive(Debug, Clone)]
pub struct ChatWindow {
    conversation_id: String,
    entries: Vec<Entry>,
    last_known: Timestamp,
    checkpoint: Timestamp,
    cap: usize,
}

impl ChatWindow {
    pub fn new(conversation_id: impl Into<String>, cap: usize) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            entries: Vec::new(),
            last_known: 0,
            checkpoint: 0,
            cap,
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Max confirmed timestamp seen so far.
    pub fn last_known(&self) -> Timestamp {
        self.last_known
    }

    pub fn checkpoint(&self) -> Timestamp {
        self.checkpoint
    }

    pub fn raise_last_known(&mut self, timestamp: Timestamp) {
        self.last_known = self.last_known.max(timestamp);
    }

    pub fn raise_checkpoint(&mut self, checkpoint: Timestamp) {
        self.checkpoint = self.checkpoint.max(checkpoint);
    }

    fn position(&self, key: &MessageKey) -> Option<usize> {
        self.entries.iter().position(|e| &e.key == key)
    }

    /// Display a local echo and return the key it is filed under.
    pub fn echo(&mut self, author_id: &str, payload: Payload, provisional: Timestamp) -> MessageKey {
        let mut key = MessageKey::new(&self.conversation_id, provisional, author_id);
        // Two sends in the same millisecond
        while self.position(&key).is_some() {
            key = key.with_timestamp(key.timestamp + 1);
        }

        self.entries.push(Entry {
            key: key.clone(),
            state: EntryState::Pending,
            payload,
            author: None,
        });
        key
    }

    /// Apply a post acknowledgment carrying the server timestamp.
    pub fn ack(&mut self, provisional: &MessageKey, timestamp: Timestamp) -> AckOutcome {
        let Some(index) = self
            .entries
            .iter()
            .position(|e| &e.key == provisional && e.state == EntryState::Pending)
        else {
            return AckOutcome::Missing;
        };

        let confirmed_key = provisional.with_timestamp(timestamp);
        let already_confirmed = self
            .entries
            .iter()
            .any(|e| e.key == confirmed_key && e.state == EntryState::Confirmed);

        if already_confirmed {
            self.entries.remove(index);
            AckOutcome::AlreadyConfirmed
        } else {
            let entry = &mut self.entries[index];
            entry.key = confirmed_key;
            entry.state = EntryState::Acknowledged;
            AckOutcome::AwaitingFetch
        }
    }

    /// Drop an echo whose post failed.
    pub fn discard(&mut self, key: &MessageKey) -> bool {
        match self.position(key) {
            Some(index) if self.entries[index].state.is_echo() => {
                self.entries.remove(index);
                true
            }
            _ => false,
        }
    }

    /// Merge fetched messages (chronological). Messages at or before the
    /// checkpoint are ignored.
    pub fn ingest(&mut self, messages: Vec<Message>) -> IngestReport {
        let mut report = IngestReport::default();

        for message in messages {
            if message.timestamp <= self.checkpoint {
                report.skipped += 1;
                continue;
            }
            self.last_known = self.last_known.max(message.timestamp);

            let key = message.key();
            match self.position(&key) {
                Some(index) if self.entries[index].state == EntryState::Confirmed => {
                    report.skipped += 1;
                }
                Some(index) => {
                    self.entries[index] = Entry {
                        key,
                        state: EntryState::Confirmed,
                        payload: message.payload,
                        author: Some(message.user),
                    };
                    report.replaced += 1;
                }
                None => {
                    self.entries.push(Entry {
                        key,
                        state: EntryState::Confirmed,
                        payload: message.payload,
                        author: Some(message.user),
                    });
                    report.added += 1;
                }
            }
        }
        report
    }

    /// Flag acknowledged echoes that fetching has already passed. Returns how
    /// many were newly flagged.
    pub fn mark_orphans(&mut self) -> usize {
        let last_known = self.last_known;
        let mut flagged = 0;
        for entry in &mut self.entries {
            if entry.state == EntryState::Acknowledged && entry.key.timestamp <= last_known {
                entry.state = EntryState::Orphaned;
                flagged += 1;
            }
        }
        flagged
    }

    /// Drop the oldest entries beyond the cap. Returns how many went.
    pub fn prune(&mut self) -> usize {
        let excess = self.entries.len().saturating_sub(self.cap);
        self.entries.drain(..excess);
        excess
    }

    /// Empty the window and move the checkpoint to the last known timestamp.
    pub fn clear(&mut self) -> Timestamp {
        self.entries.clear();
        self.checkpoint = self.checkpoint.max(self.last_known);
        self.checkpoint
    }
}
