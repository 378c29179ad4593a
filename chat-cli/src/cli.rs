//! CLI parser.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chat")]
#[command(about = "Chat sync CLI: send, history, inbox, unread, profile", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Overrides DATABASE_URL.
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Overrides LOG_FILE.
    #[arg(long, global = true)]
    pub log_file: Option<String>,

    /// Overrides BLOB_DIR.
    #[arg(long, global = true)]
    pub blob_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a message (text, attachment, or both).
    Send {
        #[arg(long)]
        from: i64,
        #[arg(long)]
        to: i64,
        /// Message text; with --file it becomes the caption.
        #[arg(short, long, default_value = "")]
        text: String,
        /// File to upload as an attachment.
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Media type of --file; guessed from the extension when omitted.
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Print a conversation, oldest first. Marks incoming messages read.
    History {
        #[arg(long)]
        me: i64,
        #[arg(long)]
        with: i64,
    },
    /// Print one row per conversation partner, most recent first.
    Inbox {
        #[arg(long)]
        me: i64,
    },
    /// Print the unread count.
    Unread {
        #[arg(long)]
        me: i64,
    },
    /// Show a profile, or set it when --name is given.
    Profile {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
    },
}
