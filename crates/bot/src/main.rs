//! Console front end: one end-user talking to support from a terminal

use std::sync::Arc;

use anyhow::Context;
use supportdesk_shared::{ChatMessage, RoomId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use supportdesk_bot::console::{parse_command, validate_theme, Command};
use supportdesk_bot::{BackendClient, BotConfig, ChatStorage, ResilientConnector};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("supportdesk_bot=info"));

    // Logs go to stderr so chat output stays readable
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = BotConfig::from_env().context("Failed to load configuration")?;
    let end_user_id = config.telegram_id.to_string();

    let backend = BackendClient::new(config.backend_url.clone(), config.api_security_key);
    let storage = ChatStorage::open(&config.chat_storage_path)
        .await
        .context("Failed to open chat storage")?;
    let connector = ResilientConnector::new(
        config.backend_url.clone(),
        config.api_security_key.to_string(),
        config.reconnect_delay,
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<ChatMessage>();
    let handler = Arc::new(tx);
    let printer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            println!("[support] {}", message.text);
        }
    });

    // Pick up the ticket left open by a previous run
    let mut active: Option<RoomId> = None;
    if let Some(chat) = storage.find_chat(config.telegram_id).await? {
        connector.connect(chat.id, &end_user_id, Arc::clone(&handler)).await?;
        println!("Resumed chat {}", chat.id);
        active = Some(chat.id);
    } else {
        println!("Type /new <theme> to contact support, /quit to exit.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::New(theme) => {
                let theme = match validate_theme(&theme) {
                    Ok(theme) => theme,
                    Err(reason) => {
                        println!("{}", reason);
                        continue;
                    }
                };
                let created = match backend
                    .create_request(config.telegram_id, &config.display_name, theme)
                    .await
                {
                    Ok(created) => created,
                    Err(e) => {
                        tracing::error!(error = %e, "Could not open ticket");
                        println!("Could not open a ticket, please try again later.");
                        continue;
                    }
                };
                storage.add_chat(created.chat_id, config.telegram_id).await?;
                connector
                    .connect(created.chat_id, &end_user_id, Arc::clone(&handler))
                    .await?;
                active = Some(created.chat_id);
                println!("Ticket opened. Support will answer here.");
            }
            Command::Say(text) => match active {
                Some(room_id) => {
                    if !connector.send(room_id, &text).await {
                        println!("Not connected right now, message not sent.");
                    }
                }
                None => println!("Open a ticket first with /new <theme>"),
            },
        }
    }

    connector.close_all().await;
    printer.abort();
    Ok(())
}
