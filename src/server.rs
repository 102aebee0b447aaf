use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use log::{error, info, warn};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::gate::{FrameGate, GateError};
use crate::processor::FrameProcessor;
use crate::protocol::{ClientEvent, FrameResponse, ServerEvent};

#[derive(Clone)]
pub struct AppState {
    gate: FrameGate<FrameProcessor>,
    started: Arc<Instant>,
}

impl AppState {
    pub fn new(processor: FrameProcessor) -> Self {
        Self {
            gate: FrameGate::new(processor),
            started: Arc::new(Instant::now()),
        }
    }

    pub fn gate(&self) -> &FrameGate<FrameProcessor> {
        &self.gate
    }
}

pub fn build_router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
}

pub fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if origin.trim() == "*" {
        return Ok(layer.allow_origin(Any));
    }
    let origin: HeaderValue = origin
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid CORS origin {:?}: {}", origin, e))?;
    Ok(layer.allow_origin(origin))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "busy": state.gate.is_busy(),
        "uptimeSecs": state.started.elapsed().as_secs(),
    }))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| session(socket, state))
}

/// Frames are handled concurrently so a frame arriving mid-flight gets the busy reply at once.
async fn session(socket: WebSocket, state: AppState) {
    let id = Uuid::new_v4();
    info!("client {} connected", id);

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(16);

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("client {}: failed to encode reply: {}", id, e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("client {}: socket error: {}", id, e);
                break;
            }
        };

        let state = state.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let reply = handle_message(&state, &text).await;
            let _ = tx.send(reply).await;
        });
    }

    drop(tx);
    let _ = writer.await;
    info!("client {} disconnected", id);
}

/// Answer one client message.
pub async fn handle_message(state: &AppState, text: &str) -> ServerEvent {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(ClientEvent::ProcessFrame(data)) => {
            ServerEvent::FrameProcessed(process_frame(state, data).await)
        }
        Err(e) => {
            warn!("rejecting malformed message: {}", e);
            ServerEvent::error(format!("invalid message: {}", e))
        }
    }
}

pub async fn process_frame(state: &AppState, data: Option<String>) -> FrameResponse {
    let data = data.unwrap_or_default();
    let result = state
        .gate
        .try_run(move |processor| processor.process_data_url(&data))
        .await;

    match result {
        Ok(Ok(report)) => FrameResponse::Report(report),
        Ok(Err(e)) => {
            error!("Error processing frame: {:#}", e);
            FrameResponse::error(format!("{:#}", e))
        }
        Err(GateError::Busy) => FrameResponse::error(GateError::Busy.to_string()),
        Err(e) => {
            error!("Error processing frame: {}", e);
            FrameResponse::error(e.to_string())
        }
    }
}
