//! In-memory message log for one conversation.
//!
//! Committed messages are kept sorted by `(created_at, id)`. Pending messages are placed right
//! after the committed message they were anchored to (the newest one known at send time) and
//! ordered among themselves by send sequence. Pure data structure: no I/O, no locking.

use std::collections::HashSet;
use std::time::Duration;

use chat_core::{Message, MessageId, UserId};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::matching::{matches, PendingMessage};

/// One visible bubble: either still pending or committed. Never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Pending(PendingMessage),
    Committed(Message),
}

impl LogEntry {
    pub fn id(&self) -> Option<MessageId> {
        match self {
            LogEntry::Committed(m) => Some(m.id),
            LogEntry::Pending(_) => None,
        }
    }

    pub fn local_id(&self) -> Option<Uuid> {
        match self {
            LogEntry::Pending(p) => Some(p.local_id),
            LogEntry::Committed(_) => None,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            LogEntry::Pending(p) => &p.body,
            LogEntry::Committed(m) => &m.body,
        }
    }

    pub fn sender_id(&self) -> UserId {
        match self {
            LogEntry::Pending(p) => p.sender_id,
            LogEntry::Committed(m) => m.sender_id,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, LogEntry::Pending(_))
    }

    pub fn is_read(&self) -> bool {
        match self {
            LogEntry::Committed(m) => m.is_read,
            LogEntry::Pending(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A pending entry was replaced by its committed row.
    Reconciled { local_id: Uuid },
    /// New message added.
    Appended,
    /// Row already present; only read state may have advanced.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    Unchanged,
    /// No committed row with that id: an insert was missed.
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ConversationLog {
    committed: Vec<Message>,
    pending: Vec<PendingMessage>,
    match_window: Duration,
}

impl ConversationLog {
    pub fn new(match_window: Duration) -> Self {
        Self {
            committed: Vec::new(),
            pending: Vec::new(),
            match_window,
        }
    }

    pub fn len(&self) -> usize {
        self.committed.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn committed(&self) -> &[Message] {
        &self.committed
    }

    pub fn pending(&self) -> &[PendingMessage] {
        &self.pending
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.committed.iter().find(|m| m.id == id)
    }

    /// Order key a new pending message anchors to.
    pub fn newest_committed_key(&self) -> Option<(DateTime<Utc>, MessageId)> {
        self.committed.last().map(Message::order_key)
    }

    /// Where a pending entry is displayed: after its anchor, and after any of the sender's own
    /// messages that committed since.
    fn display_anchor(&self, pending: &PendingMessage) -> Option<(DateTime<Utc>, MessageId)> {
        let own_newest = self
            .committed
            .iter()
            .rev()
            .find(|m| m.sender_id == pending.sender_id)
            .map(Message::order_key);
        pending.anchor.max(own_newest)
    }

    /// The visible log: committed and pending entries merged in display order.
    pub fn entries(&self) -> Vec<LogEntry> {
        let mut pending: Vec<(Option<(DateTime<Utc>, MessageId)>, &PendingMessage)> = self
            .pending
            .iter()
            .map(|p| (self.display_anchor(p), p))
            .collect();
        pending.sort_by_key(|(anchor, p)| (*anchor, p.seq));

        let mut out = Vec::with_capacity(self.len());
        let mut next = pending.into_iter().peekable();
        for message in &self.committed {
            while let Some((_, p)) = next.next_if(|(anchor, _)| *anchor < Some(message.order_key())) {
                out.push(LogEntry::Pending(p.clone()));
            }
            out.push(LogEntry::Committed(message.clone()));
        }
        out.extend(next.map(|(_, p)| LogEntry::Pending(p.clone())));
        out
    }

    pub fn push_pending(&mut self, pending: PendingMessage) {
        self.pending.push(pending);
    }

    pub fn remove_pending(&mut self, local_id: Uuid) -> Option<PendingMessage> {
        let pos = self.pending.iter().position(|p| p.local_id == local_id)?;
        Some(self.pending.remove(pos))
    }

    fn insert_sorted(&mut self, message: Message) {
        let key = message.order_key();
        let pos = self.committed.partition_point(|m| m.order_key() <= key);
        self.committed.insert(pos, message);
    }

    /// Folds an already-known row in; read state only moves false -> true.
    fn merge_existing(&mut self, row: &Message) -> bool {
        match self.committed.iter_mut().find(|m| m.id == row.id) {
            Some(existing) => {
                if row.is_read {
                    existing.is_read = true;
                }
                true
            }
            None => false,
        }
    }

    /// Applies a committed row from the feed. A matching pending entry (oldest first) is replaced
    /// instead of adding a second bubble.
    pub fn apply_insert(&mut self, row: Message) -> InsertOutcome {
        if self.merge_existing(&row) {
            return InsertOutcome::Duplicate;
        }

        let window = self.match_window;
        let matched = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| matches(p, &row, window))
            .min_by_key(|(_, p)| p.seq)
            .map(|(pos, _)| pos);

        match matched {
            Some(pos) => {
                let pending = self.pending.remove(pos);
                self.insert_sorted(row);
                InsertOutcome::Reconciled {
                    local_id: pending.local_id,
                }
            }
            None => {
                self.insert_sorted(row);
                InsertOutcome::Appended
            }
        }
    }

    /// Applies the insert result of this client's own send, keyed by its `local_id`.
    pub fn commit_pending(&mut self, local_id: Uuid, row: Message) -> InsertOutcome {
        let removed = self.remove_pending(local_id);
        if !self.merge_existing(&row) {
            self.insert_sorted(row);
            if removed.is_none() {
                return InsertOutcome::Appended;
            }
        }
        match removed {
            Some(_) => InsertOutcome::Reconciled { local_id },
            None => InsertOutcome::Duplicate,
        }
    }

    /// Applies an update row; only the read flag is taken, and never un-read.
    pub fn apply_update(&mut self, row: &Message) -> UpdateOutcome {
        match self.committed.iter_mut().find(|m| m.id == row.id) {
            Some(existing) if row.is_read && !existing.is_read => {
                existing.is_read = true;
                UpdateOutcome::Applied
            }
            Some(_) => UpdateOutcome::Unchanged,
            None => UpdateOutcome::Unknown,
        }
    }

    /// Merges a fresh history fetch. Messages are never deleted, so rows already in the log stay;
    /// fetched rows are added, and pending entries whose echo is among them are reconciled.
    /// Returns the reconciled local ids.
    pub fn merge_history(&mut self, rows: Vec<Message>) -> Vec<Uuid> {
        let mut fresh = Vec::new();
        for row in rows {
            if !self.merge_existing(&row) {
                fresh.push(row);
            }
        }

        let window = self.match_window;
        let mut claimed: HashSet<MessageId> = HashSet::new();
        let mut reconciled = Vec::new();
        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by_key(|p| p.seq);
        pending.retain(|p| {
            let echo = fresh
                .iter()
                .find(|row| !claimed.contains(&row.id) && matches(p, row, window));
            match echo {
                Some(row) => {
                    claimed.insert(row.id);
                    reconciled.push(p.local_id);
                    false
                }
                None => true,
            }
        });
        self.pending = pending;

        for row in fresh {
            self.insert_sorted(row);
        }
        reconciled
    }

    /// Marks the given committed ids read locally; returns the ids that changed.
    pub fn mark_read_local(&mut self, ids: &[MessageId]) -> Vec<MessageId> {
        let mut changed = Vec::new();
        for message in self.committed.iter_mut() {
            if !message.is_read && ids.contains(&message.id) {
                message.is_read = true;
                changed.push(message.id);
            }
        }
        changed
    }

    /// Ids of committed messages addressed to `me` that are still unread.
    pub fn unread_incoming(&self, me: UserId) -> Vec<MessageId> {
        self.committed
            .iter()
            .filter(|m| m.is_unread_for(me))
            .map(|m| m.id)
            .collect()
    }
}
