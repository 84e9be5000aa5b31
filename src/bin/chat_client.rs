//! Terminal chat client
//!
//! Usage: `chat_client <address:port> <name> [config]`
//!
//! Every line typed is sent as a chat message. `/list` asks for the roster,
//! `/quit` logs out and exits.

use std::env;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

use tcp_chat::{ChatClient, ClientConfig, Message};

const USAGE: &str = "usage: chat_client <address:port> <name> [config]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tcp_chat=warn")),
        )
        .init();

    let mut args = env::args().skip(1);
    let (Some(target), Some(name)) = (args.next(), args.next()) else {
        return Err(USAGE.into());
    };
    let config = ClientConfig::load(args.next().unwrap_or_else(|| "config.txt".to_string()))?;

    let (address, port) = target.rsplit_once(':').ok_or(USAGE)?;
    let port: u16 = port.parse().map_err(|_| USAGE)?;

    let client = ChatClient::new(config);
    client.set_message_listener(print_message);

    let closed = Arc::new(Notify::new());
    let on_close = closed.clone();
    client.set_close_listener(move || {
        println!("*** connection closed");
        on_close.notify_one();
    });

    client.start(address, port).await?;
    client.login(&name);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = closed.notified() => return Ok(()),
            line = lines.next_line() => {
                match line?.as_deref().map(str::trim) {
                    None | Some("/quit") => break,
                    Some("/list") => client.request_user_list(),
                    Some("") => {}
                    Some(text) => client.send_message(text),
                }
            }
        }
    }

    client.close().await;
    Ok(())
}

fn print_message(message: &Message) {
    match message {
        Message::ServerLoginSuccess { usid } => println!("*** logged in (session {})", usid),
        Message::ServerListResponse { users } => {
            println!("*** {} online:", users.len());
            for user in users {
                println!("    {} ({})", user.name, user.client_tag);
            }
        }
        Message::ServerEmptySuccess => {}
        Message::ServerError { text } => println!("*** error: {}", text),
        Message::ServerMessage(line) => println!("<{}> {}", line.name, line.text),
        Message::ServerUserLogin { name } => println!("*** {} joined", name),
        Message::ServerUserLogout { name } => println!("*** {} left", name),
        other => println!("*** unexpected {}", other.message_type()),
    }
}
