//! WebSocket event stream
//!
//! Every `ScrapeEvent` is pushed to the client as JSON. Clients may send
//! `{"action":"scrape","url":"..."}` to start a scrape or
//! `{"action":"ping"}` to check the connection.

use axum::extract::Extension;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

use super::AppState;
use crate::pipeline::ScrapeOptions;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientMessage {
    Scrape {
        url: String,
        #[serde(default)]
        force: bool,
    },
    Ping,
}

pub async fn ws_handler(ws: WebSocketUpgrade, Extension(state): Extension<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.scraper.subscribe());
    debug!("WebSocket client connected");

    loop {
        tokio::select! {
            event = events.next() => {
                let text = match event {
                    Some(Ok(event)) => match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Could not serialise event: {}", e);
                            continue;
                        }
                    },
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        json!({ "type": "lagged", "skipped": skipped }).to_string()
                    }
                    None => break,
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                };
                if let Some(reply) = handle_message(&state, &text) {
                    if sender.send(Message::Text(reply)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
    debug!("WebSocket client disconnected");
}

/// Act on a client message; returns an immediate reply if there is one
fn handle_message(state: &AppState, text: &str) -> Option<String> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping) => Some(json!({ "type": "pong" }).to_string()),
        Ok(ClientMessage::Scrape { url, force }) => {
            // Progress arrives through the event stream
            let scraper = state.scraper.clone();
            tokio::spawn(async move {
                let _ = scraper.scrape_url(&url, ScrapeOptions { force }).await;
            });
            None
        }
        Err(e) => Some(json!({ "type": "error", "error": e.to_string() }).to_string()),
    }
}
