//! JSON envelopes exchanged over the WebSocket.
//!
//! Client: `{"event": "process_frame", "data": "data:image/jpeg;base64,..."}`
//! Server: `{"event": "frame_processed", "data": {...}}`

use serde::{Deserialize, Serialize};

use crate::processor::FrameReport;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    ProcessFrame(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    FrameProcessed(FrameResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FrameResponse {
    Report(FrameReport),
    Error { error: String },
}

impl FrameResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::FrameProcessed(FrameResponse::error(message))
    }
}
