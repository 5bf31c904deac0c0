//! Murmur CLI: a line-based REPL over the conversation controller.
//!
//! Plain input lines are sent to the backend; `/clear` resets the
//! conversation, `/quit` exits. Assistant output is re-emitted character by
//! character as a presentation affordance, strictly downstream of the
//! decoder. Ctrl-C during a stream cancels the in-flight exchange.

use color_eyre::Result;
use murmur::{ChatClient, ChatController, ChatEvent, HistoryStore, Role, DEFAULT_BASE_URL};
use std::io::Write;
use std::pin::pin;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Delay between re-emitted characters of assistant output.
const TYPE_DELAY: Duration = Duration::from_millis(5);

/// Print one presentation event, pacing fragment text per character.
async fn print_paced(event: ChatEvent) {
    match event {
        ChatEvent::Fragment(text) => {
            for ch in text.chars() {
                print!("{ch}");
                let _ = std::io::stdout().flush();
                tokio::time::sleep(TYPE_DELAY).await;
            }
        }
        ChatEvent::Completed => println!(),
        ChatEvent::Cancelled => println!(" [cancelled]"),
        // The error itself is reported by the send result.
        ChatEvent::Failed(_) => println!(),
    }
}

fn prompt(label: &str) {
    print!("{label}");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if std::env::args().any(|arg| arg == "--version" || arg == "-V") {
        println!("murmur {VERSION}");
        return Ok(());
    }

    let base_url =
        std::env::var("MURMUR_SERVER").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let store = HistoryStore::new()?;
    let mut controller =
        ChatController::with_transport(ChatClient::with_base_url(&base_url), store);

    let (tx, mut rx) = mpsc::unbounded_channel();
    controller.set_event_sink(tx);

    println!("murmur {VERSION} - connected to {base_url}");
    println!("/clear resets the conversation, /quit exits, Ctrl-C cancels a reply");
    for message in controller.messages() {
        match message.role {
            Role::User => println!("you> {}", message.content),
            Role::Assistant => println!("{}", message.content),
        }
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        prompt("you> ");
        // Once ctrl_c() has been polled, tokio owns SIGINT for the rest of
        // the process; the prompt has to listen for it itself to keep
        // Ctrl-C-to-exit working between exchanges.
        let next_line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = next_line else {
            break;
        };
        let input = line.trim().to_string();
        match input.as_str() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                controller.clear();
                println!("(conversation cleared)");
                continue;
            }
            _ => {}
        }

        let cancel = controller.cancel_handle();
        let result = {
            let mut send = pin!(controller.send(&input));
            loop {
                tokio::select! {
                    res = &mut send => break res,
                    event = rx.recv() => {
                        if let Some(event) = event {
                            print_paced(event).await;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        cancel.cancel();
                    }
                }
            }
        };
        // The send may finish ahead of the paced printer; drain the rest.
        while let Ok(event) = rx.try_recv() {
            print_paced(event).await;
        }

        if let Err(err) = result {
            eprintln!("error: {err}");
        }
    }

    Ok(())
}
