//! Wake word control endpoints and detection event socket

use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::bridge::{Bridge, CommandResult, Status};
use crate::controller::DetectionEvent;

/// Request body carrying a credential
#[derive(Deserialize)]
pub struct CredentialRequest {
    pub credential: String,
}

/// Request body for start; a missing credential counts as empty
#[derive(Deserialize, Default)]
pub struct StartRequest {
    #[serde(default)]
    pub credential: String,
}

#[derive(Serialize)]
pub struct RunningResponse {
    pub running: bool,
}

#[derive(Serialize)]
pub struct ActivationResponse {
    pub activated: bool,
}

/// Frames pushed to the event socket
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WsOutgoing {
    /// The wake word was heard
    WakeWordDetected(DetectionEvent),
}

/// Build the `/wake` router
pub fn router(bridge: Bridge) -> Router {
    Router::new()
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/running", get(running))
        .route("/credential", post(save_credential))
        .route("/activation", post(activation))
        .route("/status", get(status))
        .route("/events", get(events))
        .with_state(bridge)
}

async fn start(
    State(bridge): State<Bridge>,
    body: Option<Json<StartRequest>>,
) -> Json<CommandResult> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    Json(bridge.start(SecretString::from(request.credential)).await)
}

async fn stop(State(bridge): State<Bridge>) -> Json<CommandResult> {
    Json(bridge.stop().await)
}

async fn running(State(bridge): State<Bridge>) -> Json<RunningResponse> {
    Json(RunningResponse {
        running: bridge.is_running().await,
    })
}

async fn save_credential(
    State(bridge): State<Bridge>,
    Json(request): Json<CredentialRequest>,
) -> Json<CommandResult> {
    Json(bridge.save_credential(&SecretString::from(request.credential)))
}

async fn activation(State(bridge): State<Bridge>) -> Json<ActivationResponse> {
    Json(ActivationResponse {
        activated: bridge.was_launched_by_detection().await,
    })
}

async fn status(
    State(bridge): State<Bridge>,
) -> Result<Json<Status>, (StatusCode, Json<CommandResult>)> {
    bridge.status().await.map(Json).map_err(|e| {
        tracing::warn!(error = %e, "status query failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(CommandResult::failed(e.reason())),
        )
    })
}

async fn events(State(bridge): State<Bridge>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, bridge))
}

/// Forward detections until the client leaves or a newer subscriber takes over
async fn handle_socket(socket: WebSocket, bridge: Bridge) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = bridge.subscribe();

    tracing::info!("event socket connected");

    loop {
        tokio::select! {
            event = subscription.next() => {
                let Some(event) = event else {
                    tracing::info!("event socket replaced by a newer subscriber");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                let Ok(text) = serde_json::to_string(&WsOutgoing::WakeWordDetected(event)) else {
                    continue;
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("event socket closed by client");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        tracing::trace!(len = data.len(), "received ping");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "event socket error");
                        break;
                    }
                }
            }
        }
    }
}
