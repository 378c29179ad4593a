//! Inbox projection: one row per conversation partner, most recent activity first.

use std::collections::HashMap;
use std::sync::Arc;

use chat_core::{
    ChatError, Message, MessageFilter, MessageStore, Profile, ProfileDirectory, Result, UserId,
};
use tracing::{info, instrument, warn};

use crate::config::SyncConfig;
use crate::timeout::with_timeout;

/// Per-partner aggregate before profiles are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerSummary {
    pub partner_id: UserId,
    pub last_message: Message,
    pub unread_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEntry {
    pub partner: Profile,
    pub last_message: Message,
    /// Messages from this partner that `identity` has not read.
    pub unread_count: u64,
}

impl InboxEntry {
    pub fn partner_id(&self) -> UserId {
        self.partner.id
    }
}

/// Sum of per-partner unread counts. Equals the global unread count for the same snapshot.
pub fn total_unread(entries: &[InboxEntry]) -> u64 {
    entries.iter().map(|e| e.unread_count).sum()
}

/// Groups `messages` involving `identity` by the other participant.
///
/// Ordered by last message `(created_at, id)`, newest first. Messages not involving `identity`
/// are skipped.
pub fn group_by_partner(identity: UserId, messages: &[Message]) -> Vec<PartnerSummary> {
    let mut by_partner: HashMap<UserId, PartnerSummary> = HashMap::new();

    for message in messages {
        let Some(partner_id) = message.conversation_key().other(identity) else {
            continue;
        };
        let unread = u64::from(message.is_unread_for(identity));

        by_partner
            .entry(partner_id)
            .and_modify(|summary| {
                if message.order_key() > summary.last_message.order_key() {
                    summary.last_message = message.clone();
                }
                summary.unread_count += unread;
            })
            .or_insert_with(|| PartnerSummary {
                partner_id,
                last_message: message.clone(),
                unread_count: unread,
            });
    }

    let mut summaries: Vec<PartnerSummary> = by_partner.into_values().collect();
    summaries.sort_by(|a, b| b.last_message.order_key().cmp(&a.last_message.order_key()));
    summaries
}

pub struct InboxProjector {
    store: Arc<dyn MessageStore>,
    profiles: Arc<dyn ProfileDirectory>,
    config: SyncConfig,
}

impl InboxProjector {
    pub fn new(
        store: Arc<dyn MessageStore>,
        profiles: Arc<dyn ProfileDirectory>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            profiles,
            config,
        }
    }

    /// Full re-projection from the store. A failed message query is a [`ChatError::Fetch`];
    /// a failed profile lookup degrades every row to a placeholder name instead.
    #[instrument(skip(self))]
    pub async fn project(&self, identity: UserId) -> Result<Vec<InboxEntry>> {
        let messages = with_timeout(
            self.config.request_timeout,
            self.store.query(&MessageFilter::Involving(identity)),
        )
        .await
        .map_err(|e| {
            warn!(identity, error = %e, "Inbox fetch failed");
            ChatError::Fetch(e.to_string())
        })?;

        let summaries = group_by_partner(identity, &messages);
        let partner_ids: Vec<UserId> = summaries.iter().map(|s| s.partner_id).collect();

        let profiles: HashMap<UserId, Profile> = if partner_ids.is_empty() {
            HashMap::new()
        } else {
            match with_timeout(
                self.config.request_timeout,
                self.profiles.resolve_identities(&partner_ids),
            )
            .await
            {
                Ok(profiles) => profiles.into_iter().map(|p| (p.id, p)).collect(),
                Err(e) => {
                    warn!(identity, error = %e, "Profile lookup failed, using placeholders");
                    HashMap::new()
                }
            }
        };

        let entries: Vec<InboxEntry> = summaries
            .into_iter()
            .map(|summary| InboxEntry {
                partner: profiles
                    .get(&summary.partner_id)
                    .cloned()
                    .unwrap_or_else(|| Profile::placeholder(summary.partner_id)),
                last_message: summary.last_message,
                unread_count: summary.unread_count,
            })
            .collect();

        info!(
            identity,
            partners = entries.len(),
            unread = total_unread(&entries),
            "step: inbox projected"
        );
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn msg(id: i64, sender_id: UserId, receiver_id: UserId, secs: i64, is_read: bool) -> Message {
        Message {
            id,
            sender_id,
            receiver_id,
            body: format!("m{}", id),
            attachment: None,
            created_at: Utc::now() + Duration::seconds(secs),
            is_read,
        }
    }

    #[test]
    fn test_group_by_partner_orders_by_latest_activity() {
        let messages = vec![
            msg(1, 2, 1, 0, false),
            msg(2, 1, 3, 5, false),
            msg(3, 2, 1, 10, false),
            msg(4, 1, 2, 11, false),
            msg(5, 4, 5, 20, false),
        ];

        let summaries = group_by_partner(1, &messages);

        let partners: Vec<UserId> = summaries.iter().map(|s| s.partner_id).collect();
        assert_eq!(partners, vec![2, 3]);
        assert_eq!(summaries[0].last_message.id, 4);
        assert_eq!(summaries[0].unread_count, 2);
        assert_eq!(summaries[1].unread_count, 0);
    }

    #[test]
    fn test_unread_counts_only_incoming_unread() {
        let messages = vec![
            msg(1, 2, 1, 0, true),
            msg(2, 2, 1, 1, false),
            msg(3, 1, 2, 2, false),
        ];

        let summaries = group_by_partner(1, &messages);

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].unread_count, 1);
    }
}
