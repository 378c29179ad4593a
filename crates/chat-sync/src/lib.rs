//! # chat-sync
//!
//! Realtime conversation synchronization engine built on the [`chat_core`] boundaries.
//!
//! - [`ConversationReconciler`] – ordered, de-duplicated log for one open conversation; merges
//!   optimistic sends, history and live feed events; drives read receipts
//! - [`matches`] – the pending↔committed pairing rule used for anti-duplication
//! - [`UnreadAggregator`] – global unread badge for the current identity
//! - [`InboxProjector`] – per-partner conversation list
//! - [`AttachmentPipeline`] – uploads a payload before its message is sent
//! - [`SyncConfig`] – timeouts and limits, loaded from env

mod attachment;
mod config;
mod inbox;
mod log;
mod matching;
mod reconciler;
mod timeout;
mod unread;

pub use attachment::AttachmentPipeline;
pub use config::SyncConfig;
pub use inbox::{group_by_partner, total_unread, InboxEntry, InboxProjector, PartnerSummary};
pub use log::{ConversationLog, InsertOutcome, LogEntry, UpdateOutcome};
pub use matching::{matches, PendingMessage};
pub use reconciler::{ConversationReconciler, ConversationSnapshot, ConversationStatus};
pub use unread::UnreadAggregator;
