//! Subcommand handlers, usable without the binary.

use std::path::Path;

use anyhow::{Context, Result};
use chat_core::{Blob, Message, Profile, ProfileDirectory, UserId};
use chat_sync::{total_unread, LogEntry};
use tracing::info;

use crate::components::ChatComponents;

/// Media type for an attachment path, from its extension.
pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

fn format_message(message: &Message) -> String {
    let mut line = format!(
        "{} #{} {} -> {}: {}",
        message.created_at.format("%Y-%m-%d %H:%M:%S"),
        message.id,
        message.sender_id,
        message.receiver_id,
        message.body
    );
    if let Some(attachment) = &message.attachment {
        line.push_str(&format!(" [{} {}]", attachment.kind.as_str(), attachment.url));
    }
    if message.is_read {
        line.push_str(" (read)");
    }
    line
}

fn format_entry(entry: &LogEntry) -> String {
    match entry {
        LogEntry::Committed(message) => format_message(message),
        LogEntry::Pending(pending) => format!("(sending) {}", pending.body),
    }
}

pub async fn send(
    components: &ChatComponents,
    from: UserId,
    to: UserId,
    text: &str,
    file: Option<&Path>,
    content_type: Option<&str>,
) -> Result<Message> {
    let reconciler = components.reconciler(from, to);
    reconciler.open().await.context("Open conversation")?;

    let sent = match file {
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Read attachment {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment".to_string());
            let content_type = content_type.unwrap_or_else(|| guess_content_type(path));
            let blob = Blob::new(bytes, content_type, file_name);
            reconciler
                .send_attachment(text, &blob, &components.attachments())
                .await
        }
        None => reconciler.send(text, None).await,
    };

    reconciler.settle().await;
    reconciler.close();
    let message = sent?;
    info!(message_id = message.id, from, to, "step: message sent");
    Ok(message)
}

pub async fn history(components: &ChatComponents, me: UserId, with: UserId) -> Result<String> {
    let reconciler = components.reconciler(me, with);
    let entries = reconciler.open().await.context("Open conversation")?;
    reconciler.settle().await;
    reconciler.close();

    if entries.is_empty() {
        return Ok(format!("No messages between {} and {}", me, with));
    }
    Ok(entries.iter().map(format_entry).collect::<Vec<_>>().join("\n"))
}

pub async fn inbox(components: &ChatComponents, me: UserId) -> Result<String> {
    let entries = components.inbox().project(me).await.context("Project inbox")?;
    if entries.is_empty() {
        return Ok("Inbox is empty".to_string());
    }

    let mut lines: Vec<String> = entries
        .iter()
        .map(|entry| {
            format!(
                "{} ({}) unread={} | {}",
                entry.partner.display_name,
                entry.partner_id(),
                entry.unread_count,
                format_message(&entry.last_message)
            )
        })
        .collect();
    lines.push(format!("Total unread: {}", total_unread(&entries)));
    Ok(lines.join("\n"))
}

pub async fn unread(components: &ChatComponents, me: UserId) -> Result<u64> {
    let aggregator = components.aggregator();
    let count = aggregator.initialize(me).await.context("Initialize unread count")?;
    aggregator.teardown(me);
    Ok(count)
}

pub async fn profile(
    components: &ChatComponents,
    id: UserId,
    name: Option<&str>,
    avatar_url: Option<&str>,
) -> Result<Profile> {
    if let Some(name) = name {
        components.profiles.upsert(id, name, avatar_url).await?;
    }
    let profile = components
        .profiles
        .resolve_identities(&[id])
        .await?
        .into_iter()
        .next()
        .unwrap_or_else(|| Profile::placeholder(id));
    Ok(profile)
}
