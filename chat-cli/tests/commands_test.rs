//! Integration tests for the `chat` subcommand handlers against an in-memory database.

use std::path::Path;

use chat_cli::{commands, ChatComponents, CliConfig};
use chat_core::AttachmentKind;
use chat_sync::SyncConfig;
use tempfile::TempDir;

async fn components() -> (ChatComponents, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = CliConfig {
        database_url: "sqlite::memory:".to_string(),
        log_file: dir.path().join("chat.log").display().to_string(),
        blob_dir: dir.path().join("blobs").display().to_string(),
        sync: SyncConfig::default(),
    };
    let components = ChatComponents::build(&config).await.unwrap();
    (components, dir)
}

/// **Test: Sent messages show up in history and reading them clears the unread count.**
///
/// **Setup:** Fresh database.
/// **Action:** 1 sends two messages to 2; 2 checks unread, reads history, checks unread again.
/// **Expected:** Unread 2, history lists both oldest first, then unread 0.
#[tokio::test]
async fn test_send_history_unread() {
    let (components, _dir) = components().await;

    let first = commands::send(&components, 1, 2, "hi", None, None).await.unwrap();
    commands::send(&components, 1, 2, "are you there?", None, None).await.unwrap();

    assert_eq!(commands::unread(&components, 2).await.unwrap(), 2);

    let history = commands::history(&components, 2, 1).await.unwrap();
    let lines: Vec<&str> = history.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains(&format!("#{}", first.id)));
    assert!(lines[0].ends_with("hi (read)"));
    assert!(lines[1].contains("are you there?"));

    assert_eq!(commands::unread(&components, 2).await.unwrap(), 0);
}

/// **Test: Blank sends are refused.**
#[tokio::test]
async fn test_send_blank_fails() {
    let (components, _dir) = components().await;

    assert!(commands::send(&components, 1, 2, "  ", None, None).await.is_err());
    assert_eq!(commands::history(&components, 1, 2).await.unwrap(), "No messages between 1 and 2");
}

/// **Test: A file is uploaded and sent with the placeholder text.**
#[tokio::test]
async fn test_send_file() {
    let (components, dir) = components().await;
    let path = dir.path().join("photo.png");
    std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

    let message = commands::send(&components, 1, 2, "", Some(path.as_path()), None).await.unwrap();

    assert_eq!(message.body, "Sent an image");
    let attachment = message.attachment.unwrap();
    assert_eq!(attachment.kind, AttachmentKind::Image);
    assert_eq!(attachment.display_name, "photo.png");
}

/// **Test: Inbox rows carry profile names and per-partner unread counts.**
#[tokio::test]
async fn test_inbox_and_profiles() {
    let (components, _dir) = components().await;
    let bea = commands::profile(&components, 2, Some("Bea"), None).await.unwrap();
    assert_eq!(bea.display_name, "Bea");
    assert!(!bea.is_placeholder);

    commands::send(&components, 2, 1, "hello", None, None).await.unwrap();
    commands::send(&components, 3, 1, "hey", None, None).await.unwrap();

    let inbox = commands::inbox(&components, 1).await.unwrap();
    let lines: Vec<&str> = inbox.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("User 3 (3) unread=1"));
    assert!(lines[1].starts_with("Bea (2) unread=1"));
    assert_eq!(lines[2], "Total unread: 2");

    let unknown = commands::profile(&components, 9, None, None).await.unwrap();
    assert!(unknown.is_placeholder);
    assert_eq!(unknown.display_name, "User 9");
}

#[test]
fn test_guess_content_type() {
    assert_eq!(commands::guess_content_type(Path::new("a.JPG")), "image/jpeg");
    assert_eq!(commands::guess_content_type(Path::new("clip.mp4")), "video/mp4");
    assert_eq!(commands::guess_content_type(Path::new("notes")), "application/octet-stream");
}
