use clap::Parser;
use pchat_client::{
    ClientConfig, ConversationMonitor, HttpChatApi, KnownChats, SessionEvent, SyncSession,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser)]
#[command(name = "pchat-watch")]
#[command(about = "Follow pchat conversations from a terminal")]
struct Cli {
    /// User id sent as the x-user identity
    #[arg(short, long)]
    user: String,

    #[arg(short, long, env = "PCHAT_SERVER_URL", default_value = "http://localhost:3001")]
    server: String,

    /// Open this conversation and send stdin lines to it
    #[arg(short, long)]
    conversation: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pchat_client=info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = ClientConfig::for_user(&cli.user).with_base_url(&cli.server);
    let api = Arc::new(HttpChatApi::new(&config)?);
    let known = KnownChats::new();

    info!("=== pchat watch ===");
    info!("Server: {} as {}", config.base_url, config.user_id);

    let monitor = Arc::new(ConversationMonitor::new(
        api.clone(),
        known.clone(),
        config.monitor_interval,
    ));

    let Some(conversation_id) = cli.conversation else {
        let mut new_chats = monitor.subscribe_new_chats();
        let mut updates = monitor.subscribe_updates();
        let _monitor = monitor.spawn();
        loop {
            tokio::select! {
                Ok(chat) = new_chats.recv() => println!("* new chat: {} [{}]", chat.title, chat.conversation_id),
                Ok(chat) = updates.recv() => println!("* activity in {} at {}", chat.summary.title, chat.last_seen_timestamp),
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        return Ok(());
    };

    let session = SyncSession::open(api, config, &conversation_id, known).await?;
    let mut events = session.subscribe();
    for entry in session.entries() {
        print_entry(&entry);
    }

    let _notices = session.attach(&monitor);
    let _monitor = monitor.spawn();
    let _poller = session.spawn();

    let mut printed = session.last_known();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::Status(line)) => println!("-- {}", line),
                Ok(SessionEvent::WindowChanged) => {
                    for entry in session.entries() {
                        if entry.key.timestamp > printed && entry.author.is_some() {
                            print_entry(&entry);
                            printed = entry.key.timestamp;
                        }
                    }
                }
                Err(_) => continue,
            },
            line = lines.next_line() => match line? {
                Some(line) if line == "/clear" => session.clear().await?,
                Some(line) if line == "/leave" => {
                    session.leave().await?;
                    break;
                }
                Some(line) => {
                    // Failures are reported as a status event
                    let _ = session.send_text(&line).await;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn print_entry(entry: &pchat_client::Entry) {
    let author = entry
        .author
        .as_ref()
        .map(|a| a.username.as_str())
        .unwrap_or("me");
    match &entry.payload {
        pchat_common::Payload::Text(text) => println!("[{}] {}", author, text),
        pchat_common::Payload::Media(media) => println!("[{}] <media {}>", author, media),
    }
}
