//! TUI-less one-shot `ask` command.
//!
//! Drives the same controller the chat surface uses: bullets are printed as
//! soon as their line is complete, the trailing still-growing item last.

use std::error::Error;
use std::time::Duration;

use crate::client::bullets::derive_items;
use crate::client::controller::{ChatController, Phase};
use crate::client::transport::StreamTransport;
use crate::core::config::Config;
use crate::core::message::TranscriptRole;
use crate::utils::url::construct_api_url;

pub async fn run_ask(
    question: Vec<String>,
    expert: String,
    server: String,
    no_stream: bool,
    config: &Config,
) -> Result<(), Box<dyn Error>> {
    let question = question.join(" ");
    if question.trim().is_empty() {
        eprintln!("Usage: pundit ask <question>");
        std::process::exit(1);
    }

    if no_stream {
        return run_blocking(&question, &expert, &server).await;
    }

    let idle_timeout = Duration::from_secs(config.stream_idle_timeout_secs);
    let (transport, mut rx) = StreamTransport::new(server, idle_timeout);
    let mut controller = ChatController::new(expert);

    let params = match controller.submit(&question) {
        Some(params) => params,
        None => {
            eprintln!("Usage: pundit ask <question>");
            std::process::exit(1);
        }
    };
    transport.spawn_connection(params);

    let mut printed = 0usize;
    while let Some((message, stream_id)) = rx.recv().await {
        controller.handle_event(message, stream_id);

        let items = controller.assistant_items();
        // While streaming, the last item may still grow; hold it back.
        let stable = if controller.phase().is_terminal() {
            items.len()
        } else {
            items.len().saturating_sub(1)
        };
        while printed < stable {
            println!("- {}", items[printed]);
            printed += 1;
        }

        match controller.phase() {
            Phase::Completed | Phase::Cancelled => break,
            Phase::Failed => {
                if let Some(note) = controller
                    .messages()
                    .iter()
                    .rev()
                    .find(|m| m.role == TranscriptRole::ErrorNote)
                {
                    eprintln!("Error: {}", note.content);
                }
                std::process::exit(1);
            }
            _ => {}
        }
    }

    Ok(())
}

async fn run_blocking(question: &str, expert: &str, server: &str) -> Result<(), Box<dyn Error>> {
    let url = construct_api_url(server, "chat");
    let response = reqwest::Client::new()
        .get(url)
        .query(&[("expert", expert), ("q", question.trim())])
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        eprintln!("Error ({status}): {}", body.trim());
        std::process::exit(1);
    }

    let text = response.text().await?;
    for item in derive_items(&text) {
        println!("- {item}");
    }
    Ok(())
}
