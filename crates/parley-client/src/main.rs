use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use parley_chat::config::{Config, StoreConfig};
use parley_chat::{
    Bucket, ChatClient, Conversation, Draft, HttpUploader, MediaFile, MediaUploader, Session,
    UnconfiguredUploader,
};
use parley_store::{LocalStore, RealtimeStore, RestStore};
use parley_types::models::{MediaKind, Message, ParticipantId};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Config
    let config = Config::from_env()?;

    let store: Arc<dyn RealtimeStore> = match &config.store {
        StoreConfig::Local { db_path } => {
            info!("Using local store at {}", db_path.display());
            Arc::new(LocalStore::open(db_path)?)
        }
        StoreConfig::Rest(rest) => {
            info!("Using hosted store at {}", rest.base_url);
            Arc::new(RestStore::new(rest.clone())?)
        }
    };

    let uploader: Arc<dyn MediaUploader> = match config.upload.clone() {
        Some(upload) => Arc::new(HttpUploader::new(upload)?),
        None => {
            warn!("PARLEY_UPLOAD_CLOUD not set, attachments are disabled");
            Arc::new(UnconfiguredUploader)
        }
    };

    let session = Session::new(config.user_id.clone(), config.user_email.clone())?;
    let client = ChatClient::new(store, uploader, session).with_retry(config.retry);

    register_self(&client, config.user_avatar.as_deref()).await;

    let Some(peer) = config.peer_id.clone() else {
        return list_roster(&client).await;
    };

    let chat = client.conversation(&peer)?;
    info!("Chatting with '{}' in channel '{}'", chat.peer(), chat.channel());

    let me = client.session().participant().clone();
    let _feed = chat.watch_feed(Local, move |buckets| render(buckets, &me))?;

    run_prompt(&chat).await
}

/// Make sure the signed-in participant shows up in other clients' rosters.
async fn register_self(client: &ChatClient, avatar: Option<&Path>) {
    let avatar = match avatar {
        Some(path) => match MediaFile::from_path(path, Some(MediaKind::Image)).await {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("Skipping avatar: {}", e);
                None
            }
        },
        None => None,
    };

    if let Err(e) = client.register_self(avatar).await {
        warn!(
            "Could not register '{}' in the directory: {}",
            client.session().participant(),
            e
        );
    }
}

async fn list_roster(client: &ChatClient) -> anyhow::Result<()> {
    println!("Set PARLEY_PEER_ID to one of:");
    for entry in client.directory().roster().await? {
        if &entry.id == client.session().participant() {
            continue;
        }
        println!("  {:<24} {}", entry.id.as_str(), entry.profile.name);
    }
    Ok(())
}

/// Read lines from stdin until EOF. A line is sent as text, except:
///   /attach [kind] <path>   send a file
///   /delete <message-id>    remove a message
///   /quit
async fn run_prompt(chat: &Conversation) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        let result = match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/delete", id) => chat.remove(id.trim()).await,
            ("/attach", args) => match read_attachment(args).await {
                Ok(file) => {
                    let mut draft = Draft::new();
                    draft.attach_file(file);
                    chat.send(&mut draft).await.map(|_| ())
                }
                Err(e) => Err(e),
            },
            _ => {
                let mut draft = Draft::with_text(line);
                chat.send(&mut draft).await.map(|_| ())
            }
        };

        if let Err(e) = result {
            error!("{}", e);
        }
    }

    info!("Bye");
    Ok(())
}

async fn read_attachment(args: &str) -> Result<MediaFile, parley_chat::ChatError> {
    let args = args.trim();
    let (kind, path) = match args.split_once(' ') {
        Some((kind, path)) => match kind.parse::<MediaKind>() {
            Ok(kind) => (Some(kind), path.trim()),
            Err(_) => (None, args),
        },
        None => (None, args),
    };
    MediaFile::from_path(Path::new(path), kind).await
}

fn render(buckets: &[Bucket], me: &ParticipantId) {
    println!();
    for bucket in buckets {
        println!("--- {} ---", bucket.label);
        for msg in &bucket.messages {
            println!("{}", format_line(msg, me));
        }
    }
}

fn format_line(msg: &Message, me: &ParticipantId) -> String {
    let time = msg
        .sent_at()
        .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".into());
    let who = if &msg.sender == me { "me" } else { msg.sender.as_str() };

    match &msg.attachment {
        Some(att) => format!("[{}] {:>8}: <{}> {}  ({})", time, who, att.kind, att.url, msg.id),
        None => format!("[{}] {:>8}: {}  ({})", time, who, msg.content, msg.id),
    }
}
