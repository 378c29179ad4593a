//! chat CLI: send messages, print history/inbox/unread, manage profiles. Config from env and flags.

use anyhow::Result;
use chat_cli::{commands, ChatComponents, Cli, CliConfig, Commands};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = CliConfig::load(cli.database_url, cli.log_file, cli.blob_dir)?;
    chat_core::init_tracing(&config.log_file)?;

    let components = ChatComponents::build(&config).await?;

    match cli.command {
        Commands::Send {
            from,
            to,
            text,
            file,
            content_type,
        } => {
            let message = commands::send(
                &components,
                from,
                to,
                &text,
                file.as_deref(),
                content_type.as_deref(),
            )
            .await?;
            println!("Sent #{} at {}", message.id, message.created_at.to_rfc3339());
        }
        Commands::History { me, with } => {
            println!("{}", commands::history(&components, me, with).await?);
        }
        Commands::Inbox { me } => {
            println!("{}", commands::inbox(&components, me).await?);
        }
        Commands::Unread { me } => {
            println!("Unread: {}", commands::unread(&components, me).await?);
        }
        Commands::Profile {
            id,
            name,
            avatar_url,
        } => {
            let profile =
                commands::profile(&components, id, name.as_deref(), avatar_url.as_deref()).await?;
            let suffix = if profile.is_placeholder { " (no profile)" } else { "" };
            println!(
                "{}: {}{} {}",
                profile.id,
                profile.display_name,
                suffix,
                profile.avatar_url.unwrap_or_default()
            );
        }
    }

    Ok(())
}
