//! Terminal client execution logic.

use std::sync::Arc;

use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};

use crate::{
    config::ChannelConfig,
    connection::ChannelEvent,
    domain::{RoomId, SenderId},
    infrastructure::{HttpChatApi, InMemoryUnreadCounts},
    session::{ChatSession, Collaborators},
    transport,
};

use super::{
    formatter::MessageFormatter,
    input::{Input, parse_input},
    ui::redisplay_prompt,
};

/// Options of one terminal session
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Streaming endpoint, e.g. `ws://127.0.0.1:8080/ws`
    pub url: String,
    pub fallback_urls: Vec<String>,
    /// REST API root, e.g. `http://127.0.0.1:8080`
    pub api_url: String,
    pub user_id: String,
    /// Room entered on start
    pub room: RoomId,
}

/// Run the terminal client until the user quits
pub async fn run_client(options: ClientOptions) -> Result<(), Box<dyn std::error::Error>> {
    let user_id = SenderId::new(options.user_id.clone())?;
    let config = ChannelConfig {
        url: options.url.clone(),
        fallback_urls: options.fallback_urls.clone(),
        user_id: options.user_id.clone(),
        ..ChannelConfig::default()
    };

    let api = Arc::new(HttpChatApi::new(options.api_url.clone(), user_id.clone()));
    let unread = Arc::new(InMemoryUnreadCounts::new());
    let session = ChatSession::new(
        config.clone(),
        transport::from_config(&config),
        Collaborators::from_api(api, unread),
    )?;

    tracing::info!("Connecting to {} as '{}'", options.url, user_id);
    session.open().await?;

    let mut room = options.room;
    enter_and_show(&session, room).await?;
    println!(
        "\nYou are '{}'. Type messages and press Enter to send. \
         Commands: /older, /room <id>, /status, /quit. Press Ctrl+C to exit.\n",
        user_id
    );

    let (current_room_tx, current_room_rx) = watch::channel(room);
    let printer = spawn_event_printer(session.clone(), session.events(), current_room_rx);
    let mut input_rx = spawn_line_reader(user_id.to_string());

    while let Some(line) = input_rx.recv().await {
        match parse_input(&line) {
            Input::Say(body) => {
                if let Err(e) = session.send_message(room, body).await {
                    print!("{}", MessageFormatter::format_error(&e));
                    redisplay_prompt(user_id.as_str());
                }
            }
            Input::Older => {
                match session.load_older(room).await {
                    Ok(count) => print!("{}", MessageFormatter::format_older_loaded(count)),
                    Err(e) => print!("{}", MessageFormatter::format_error(&e)),
                }
                redisplay_prompt(user_id.as_str());
            }
            Input::Switch(next) if next == room => redisplay_prompt(user_id.as_str()),
            Input::Switch(next) => {
                session.leave_room(room).await?;
                match enter_and_show(&session, next).await {
                    Ok(()) => {
                        room = next;
                        current_room_tx.send_replace(room);
                    }
                    Err(e) => {
                        print!("{}", MessageFormatter::format_error(&e));
                        enter_and_show(&session, room).await?;
                    }
                }
                redisplay_prompt(user_id.as_str());
            }
            Input::Status => {
                print!("{}", MessageFormatter::format_status(session.status()));
                redisplay_prompt(user_id.as_str());
            }
            Input::Quit => break,
            Input::Invalid(reason) => {
                print!("{}", MessageFormatter::format_error(&reason));
                redisplay_prompt(user_id.as_str());
            }
        }
    }

    printer.abort();
    session.leave_room(room).await?;
    session.close().await?;
    tracing::info!("Client session ended");

    Ok(())
}

async fn enter_and_show(
    session: &ChatSession,
    room_id: RoomId,
) -> Result<(), crate::error::ChannelError> {
    session.enter_room(room_id).await?;
    let messages = session.messages(room_id).await;
    print!(
        "{}",
        MessageFormatter::format_room_entered(room_id, &messages, session.user_id())
    );
    if let Some(latest) = messages.iter().rev().find_map(|message| message.message_id()) {
        session.mark_visible(room_id, latest).await;
    }
    Ok(())
}

/// Print live messages of the current room and channel notices.
fn spawn_event_printer(
    session: ChatSession,
    mut events: broadcast::Receiver<ChannelEvent>,
    current_room: watch::Receiver<RoomId>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let me = session.user_id().clone();
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Terminal fell behind by {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let output = match &event {
                ChannelEvent::Message(incoming) => {
                    let room_id = *current_room.borrow();
                    if incoming.room_id() != room_id {
                        continue;
                    }
                    session.mark_visible(room_id, incoming.message_id).await;
                    MessageFormatter::format_chat_message(&incoming.message, &me)
                }
                ChannelEvent::Status(state) => MessageFormatter::format_status(*state),
                other => match MessageFormatter::format_notice(other) {
                    Some(output) => output,
                    None => continue,
                },
            };
            print!("{}", output);
            redisplay_prompt(me.as_str());
        }
    })
}

/// Read lines on a blocking thread; the channel closes on Ctrl+C or Ctrl+D.
fn spawn_line_reader(user_id: String) -> mpsc::UnboundedReceiver<String> {
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        let prompt = format!("{}> ", user_id);

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    input_rx
}
