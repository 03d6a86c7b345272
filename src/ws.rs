//! WebSocket progress channel.
//!
//! Clients connect to `/socket.io` and exchange JSON frames shaped
//! `{"event": ..., "data": ...}`. A `join-generation` frame subscribes the
//! connection to that generation's room; `leave-generation` unsubscribes.
//! Server-to-client frames carry the events of the orchestrator and phase 3.

use std::collections::HashSet;

use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::app::AppState;
use crate::events::EventBus;

#[derive(Debug, Deserialize, PartialEq)]
struct ClientFrame {
    event: String,
    data: ClientFrameData,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ClientFrameData {
    generation_id: Uuid,
}

/// クライアントからのフレームを解釈する。未知のイベントは無視対象。
fn parse_client_frame(raw: &str) -> Option<ClientFrame> {
    serde_json::from_str(raw).ok()
}

pub(crate) async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let events = state.events().clone();
    ws.on_upgrade(move |socket| run(socket, events))
}

async fn run(mut socket: WebSocket, events: EventBus) {
    let mut rx = events.subscribe();
    let mut joined: HashSet<Uuid> = HashSet::new();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        let Some(frame) = parse_client_frame(&text) else {
                            continue;
                        };
                        match frame.event.as_str() {
                            "join-generation" => {
                                debug!(generation_id = %frame.data.generation_id, "client joined room");
                                joined.insert(frame.data.generation_id);
                            }
                            "leave-generation" => {
                                debug!(generation_id = %frame.data.generation_id, "client left room");
                                joined.remove(&frame.data.generation_id);
                            }
                            _ => {}
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        if !joined.contains(&event.generation_id()) {
                            continue;
                        }
                        let Ok(payload) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if socket.send(WsMessage::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_frames_parse() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"event":"join-generation","data":{{"generationId":"{id}"}}}}"#);
        let frame = parse_client_frame(&raw).expect("parses");
        assert_eq!(frame.event, "join-generation");
        assert_eq!(frame.data.generation_id, id);
    }

    #[test]
    fn malformed_frames_are_ignored() {
        assert!(parse_client_frame("not json").is_none());
        assert!(parse_client_frame(r#"{"event":"join-generation"}"#).is_none());
    }
}
