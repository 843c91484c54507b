//! Interactive chat client.
//!
//! Joins one room plus the presence channel and reads commands from stdin.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-client -- --session <id> --user-id alice --room general
//! ```

use clap::Parser;
use hiroba_client::{ChannelKey, ClientEvent, ClientSession, SessionConfig};
use hiroba_shared::{Frame, FrameType, PresenceStatus, logger::setup_logger};
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "hiroba-client", about = "Hiroba chat client")]
struct ClientArgs {
    /// Server WebSocket base URL
    #[arg(long, default_value = "ws://127.0.0.1:8080")]
    url: String,

    /// Session id issued by /api/auth/login
    #[arg(long)]
    session: String,

    #[arg(long)]
    user_id: String,

    #[arg(long)]
    display_name: Option<String>,

    /// Room to join
    #[arg(long, default_value = "general")]
    room: String,

    #[arg(long, default_value = "warn")]
    log_level: String,
}

const HELP: &str =
    "/nudge | /wink <id> | /status <online|busy|away|offline> | /typing | /history | /quit";

fn clock(timestamp: Option<i64>) -> String {
    timestamp
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%H:%M:%S")
                .to_string()
        })
        .unwrap_or_default()
}

fn render(frame: &Frame) -> String {
    let sender = frame.sender_id.as_deref().unwrap_or("-");
    let content = frame.content.as_deref().unwrap_or_default();
    match frame.kind {
        FrameType::System => format!("[{}] * {}", clock(frame.timestamp), content),
        FrameType::Nudge => format!("[{}] {} sent a nudge!", clock(frame.timestamp), sender),
        _ if frame.is_wink == Some(true) => format!(
            "[{}] {} winked ({})",
            clock(frame.timestamp),
            sender,
            frame.wink_id.as_deref().unwrap_or("?")
        ),
        _ => format!(
            "[{}] <{}> {} ({})",
            clock(frame.timestamp),
            sender,
            content,
            frame.status.as_deref().unwrap_or("sent")
        ),
    }
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::State { channel, state } => println!("-- {channel}: {state:?}"),
        ClientEvent::History { room, count } => println!("-- {room}: {count} messages in history"),
        ClientEvent::Message { room, frame } => println!("#{room} {}", render(frame)),
        ClientEvent::StatusChanged { room, id, status } => {
            println!("-- #{room} message {id} is {status}")
        }
        ClientEvent::Typing { room, users } if !users.is_empty() => {
            println!("-- #{room} {} typing...", users.join(", "))
        }
        ClientEvent::Participants { room, participants } => {
            let names: Vec<String> = participants
                .iter()
                .map(|p| format!("{} ({})", p.display_name, p.status))
                .collect();
            println!("-- #{room} here: {}", names.join(", "));
        }
        ClientEvent::Error { channel, content } => println!("!! {channel}: {content}"),
        _ => {}
    }
}

async fn handle_line(session: &ClientSession, room: &str, line: &str) -> bool {
    let result = match line.split_once(' ').unwrap_or((line, "")) {
        ("/quit", _) => return false,
        ("/nudge", _) => session.send_nudge(room).await,
        ("/wink", wink) if !wink.is_empty() => session.send_wink(room, wink.trim()).await,
        ("/typing", _) => session.send_typing(room, true).await,
        ("/status", status) => match status.trim().parse::<PresenceStatus>() {
            Ok(status) => session.set_presence(status, None).await,
            Err(e) => {
                println!("!! {e}");
                Ok(())
            }
        },
        ("/history", _) => {
            for frame in session.messages(room).await {
                println!("{}", render(&frame));
            }
            session.open_room(room).await.map(|_| ())
        }
        (command, _) if command.starts_with('/') => {
            println!("{HELP}");
            Ok(())
        }
        _ => session.send_chat(room, line).await.map(|_| ()),
    };
    if let Err(e) = result {
        println!("!! {e}");
    }
    true
}

#[tokio::main]
async fn main() {
    let args = ClientArgs::parse();
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    let mut config = SessionConfig::new(&args.url, &args.session, &args.user_id);
    if let Some(name) = &args.display_name {
        config = config.with_display_name(name);
    }
    let session = ClientSession::new(config);

    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    });

    let room_key = ChannelKey::Room(args.room.clone());
    let connected = async {
        session.connect_presence().await?;
        session.connect_room(&args.room).await?;
        session.wait_open(&room_key).await
    };
    if let Err(e) = connected.await {
        tracing::error!("Failed to connect: {}", e);
        std::process::exit(1);
    }
    println!("{HELP}");

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    let reader = tokio::task::spawn_blocking(move || {
        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                tracing::error!("Failed to open the line editor: {}", e);
                return;
            }
        };
        loop {
            match editor.readline("> ") {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(line.as_str());
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(e) => {
                    tracing::error!("Failed to read input: {}", e);
                    break;
                }
            }
        }
    });

    while let Some(line) = line_rx.recv().await {
        if !handle_line(&session, &args.room, &line).await {
            break;
        }
    }

    session.shutdown();
    // close frames
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    drop(reader);
    std::process::exit(0);
}
