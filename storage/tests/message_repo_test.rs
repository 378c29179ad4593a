//! Integration tests for [`storage::MessageRepository`] through the [`chat_core::MessageStore`] boundary.
//!
//! Covers conversation/inbox/received-by queries and their ordering, idempotent read marking,
//! and unread counting, using an in-memory SQLite database.

use chat_core::{ConversationKey, MessageFilter, MessageStore, NewMessage};
use storage::MessageRepository;

async fn repo() -> MessageRepository {
    MessageRepository::new("sqlite::memory:")
        .await
        .expect("Failed to create repository")
}

fn text(sender_id: i64, receiver_id: i64, body: &str) -> NewMessage {
    NewMessage {
        sender_id,
        receiver_id,
        body: body.to_string(),
        attachment: None,
    }
}

/// **Test: Conversation query returns both directions, oldest first, and nothing else.**
///
/// **Setup:** Messages 1→2, 2→1, 1→3, 2→1.
/// **Action:** `query(Conversation(2,1))`.
/// **Expected:** The three 1↔2 messages in insertion order.
#[tokio::test]
async fn test_query_conversation_in_both_directions() {
    let repo = repo().await;
    repo.insert(&text(1, 2, "hi")).await.unwrap();
    repo.insert(&text(2, 1, "hello")).await.unwrap();
    repo.insert(&text(1, 3, "other thread")).await.unwrap();
    repo.insert(&text(2, 1, "how are you")).await.unwrap();

    let messages = repo
        .query(&MessageFilter::Conversation(ConversationKey::new(2, 1)))
        .await
        .unwrap();

    let bodies: Vec<&str> = messages.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["hi", "hello", "how are you"]);
    assert!(messages.windows(2).all(|w| w[0].order_key() < w[1].order_key()));
}

/// **Test: Involving and received-by filters.**
///
/// **Setup:** Messages 1→2, 3→1, 2→3.
/// **Action:** `query(Involving(1))`, `query(ReceivedBy(3))`.
/// **Expected:** Involving(1) has two rows; ReceivedBy(3) has one.
#[tokio::test]
async fn test_query_involving_and_received_by() {
    let repo = repo().await;
    repo.insert(&text(1, 2, "a")).await.unwrap();
    repo.insert(&text(3, 1, "b")).await.unwrap();
    repo.insert(&text(2, 3, "c")).await.unwrap();

    let involving = repo.query(&MessageFilter::Involving(1)).await.unwrap();
    assert_eq!(involving.len(), 2);

    let received = repo.query(&MessageFilter::ReceivedBy(3)).await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body, "c");
}

/// **Test: Unread count follows read marking; re-marking is a no-op, not an error.**
///
/// **Setup:** Three messages to user 2, one to user 1.
/// **Action:** Mark two of user 2's messages read, then mark one again.
/// **Expected:** count_unread(2) goes 3 → 1 → 1; count_unread(1) stays 1.
#[tokio::test]
async fn test_count_unread_and_idempotent_update() {
    let repo = repo().await;
    let a = repo.insert(&text(1, 2, "a")).await.unwrap();
    let b = repo.insert(&text(1, 2, "b")).await.unwrap();
    repo.insert(&text(1, 2, "c")).await.unwrap();
    repo.insert(&text(2, 1, "d")).await.unwrap();

    assert_eq!(repo.count_unread(2).await.unwrap(), 3);

    repo.update_read_state(&[a.id, b.id]).await.unwrap();
    assert_eq!(repo.count_unread(2).await.unwrap(), 1);

    repo.update_read_state(&[a.id]).await.unwrap();
    assert_eq!(repo.count_unread(2).await.unwrap(), 1);
    assert_eq!(repo.count_unread(1).await.unwrap(), 1);
}

/// **Test: A database file survives reopening.**
///
/// **Setup:** Temp directory; save a message through one repository.
/// **Action:** Open a second repository on the same file.
/// **Expected:** The message is visible.
#[tokio::test]
async fn test_file_database_persists() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("chat.db").display());

    let saved = MessageRepository::new(&url)
        .await
        .unwrap()
        .insert(&text(1, 2, "persisted"))
        .await
        .unwrap();

    let reopened = MessageRepository::new(&url).await.unwrap();
    let found = reopened.get_message_by_id(saved.id).await.unwrap();
    assert_eq!(found.map(|m| m.body), Some("persisted".to_string()));
}
