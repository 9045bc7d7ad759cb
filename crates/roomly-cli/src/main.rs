use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use roomly_chat::channel::DEFAULT_MESSAGE_LIMIT;
use roomly_chat::config::{DEFAULT_API_URL, DEFAULT_STATE_DIR};
use roomly_chat::directory::{DEFAULT_CONVERSATION_LIMIT, MAX_PAGE_LIMIT};
use roomly_chat::{ChatClient, ChatConfig, export};
use roomly_types::models::{Conversation, ConversationId, ListingId, Message, UserId};

#[derive(Debug, Parser)]
#[command(name = "roomly")]
#[command(about = "Roomly marketplace messaging from the terminal")]
struct Args {
    #[arg(long, env = "ROOMLY_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    #[arg(long, env = "ROOMLY_TOKEN")]
    token: Option<String>,

    /// Id of the signed-in user.
    #[arg(long, env = "ROOMLY_USER_ID")]
    user_id: String,

    #[arg(long, env = "ROOMLY_TIMEOUT_SECS", default_value_t = 15)]
    timeout_secs: u64,

    #[arg(long, env = "ROOMLY_STATE_DIR", default_value = DEFAULT_STATE_DIR)]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List conversations, most recent first.
    Conversations {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_CONVERSATION_LIMIT)]
        limit: u32,
    },
    /// Show one page of a conversation.
    Messages {
        conversation: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_MESSAGE_LIMIT)]
        limit: u32,
    },
    Send {
        conversation: String,
        text: String,
    },
    /// Mark a conversation read.
    Read { conversation: String },
    /// Unread messages across all conversations.
    Unread,
    /// Start (or find) a conversation with another user.
    Open {
        user: String,
        #[arg(long)]
        listing: Option<String>,
    },
    /// Write a conversation transcript to stdout.
    Export {
        conversation: String,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomly=info,roomly_chat=debug".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = ChatConfig::new(&args.api_url, args.user_id.as_str())
        .context("invalid configuration")?
        .with_timeout(Duration::from_secs(args.timeout_secs))
        .with_state_dir(args.state_dir);
    if let Some(token) = args.token {
        config = config.with_token(token);
    }
    info!("Using API at {} as {}", config.api_url, config.viewer);

    let client = ChatClient::from_config(&config)?;

    match args.command {
        Command::Conversations { page, limit } => {
            let listing = client.directory().list_conversations(page, limit).await?;
            if listing.is_empty() {
                println!("No conversations yet.");
            }
            for conv in &listing.items {
                print_conversation(client.viewer(), conv);
            }
            let p = &listing.pagination;
            println!("-- page {}/{} ({} total)", p.page, p.total_pages.max(1), p.total);
        }
        Command::Messages {
            conversation,
            page,
            limit,
        } => {
            let messages = client
                .channel()
                .list_messages(&ConversationId::new(conversation), page, limit)
                .await?;
            for message in &messages {
                print_message(client.viewer(), message);
            }
        }
        Command::Send { conversation, text } => {
            let sent = client
                .channel()
                .send_text(&ConversationId::new(conversation), text)
                .await?;
            println!("sent {} at {}", sent.id, sent.created_at.format("%Y-%m-%d %H:%M"));
        }
        Command::Read { conversation } => {
            client
                .channel()
                .mark_as_read(&ConversationId::new(conversation))
                .await?;
        }
        Command::Unread => {
            println!("{}", client.channel().get_unread_count().await?);
        }
        Command::Open { user, listing } => {
            let listing = listing.map(ListingId::new);
            let conv = client
                .directory()
                .create_or_get_conversation(&UserId::new(user), listing.as_ref())
                .await?;
            print_conversation(client.viewer(), &conv);
        }
        Command::Export {
            conversation,
            format,
        } => {
            let id = ConversationId::new(conversation);
            let messages = client.channel().list_all_messages(&id, MAX_PAGE_LIMIT).await?;
            info!("Exporting {} messages from {}", messages.len(), id);
            match format {
                Format::Json => println!("{}", export::to_json(&messages)?),
                Format::Csv => print!("{}", export::to_csv(&messages)),
            }
        }
    }

    Ok(())
}

fn print_conversation(viewer: &UserId, conv: &Conversation) {
    let with = conv
        .counterpart(viewer)
        .map(|p| if p.name.is_empty() { p.id.to_string() } else { p.name.clone() })
        .unwrap_or_else(|| "(nobody)".into());
    let listing = conv
        .listing
        .as_ref()
        .and_then(|l| l.title.clone())
        .map(|t| format!(" [{}]", t))
        .unwrap_or_default();
    let unread = if conv.unread_count > 0 {
        format!(" ({} unread)", conv.unread_count)
    } else {
        String::new()
    };
    let preview = conv
        .last_message
        .as_ref()
        .map(|m| format!(": {}", m.content))
        .unwrap_or_default();
    println!("{}  {}{}{}{}", conv.id, with, listing, unread, preview);
}

fn print_message(viewer: &UserId, message: &Message) {
    let who = if &message.sender_id == viewer {
        "me".to_string()
    } else {
        message.sender_id.to_string()
    };
    let body = if message.attachments.is_empty() {
        message.content.clone()
    } else {
        format!("{} [{}]", message.content, message.attachments.join(", "))
    };
    println!(
        "{} {:>8} {:?}: {}",
        message.created_at.format("%Y-%m-%d %H:%M"),
        who,
        message.state,
        body
    );
}
