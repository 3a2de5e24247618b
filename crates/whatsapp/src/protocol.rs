//! JSON frames exchanged with the sidecar over its WebSocket.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    types::{ClientSignal, InboundMessage, OutgoingContent},
};

/// Frames sent to the sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    Initialize {
        request_id: String,
        session_dir: PathBuf,
        headless: bool,
        browser_args: Vec<String>,
    },
    SendMessage {
        request_id: String,
        chat_id: String,
        content: OutgoingContent,
    },
    Destroy {
        request_id: String,
    },
}

impl GatewayMessage {
    #[must_use]
    pub fn request_id(&self) -> &str {
        match self {
            Self::Initialize { request_id, .. }
            | Self::SendMessage { request_id, .. }
            | Self::Destroy { request_id } => request_id,
        }
    }
}

/// Frames received from the sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    Qr {
        qr: String,
    },
    Ready {
        #[serde(default)]
        phone_number: Option<String>,
    },
    AuthFailure {
        message: String,
    },
    Disconnected {
        reason: String,
    },
    Message(InboundMessage),
    MessageAck {
        message_id: String,
        ack: i32,
    },
    Response(SidecarResponse),
    Error {
        error: String,
    },
}

/// Reply to a [`GatewayMessage`], matched by `request_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarResponse {
    pub request_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SidecarResponse {
    /// Turn an unsuccessful response into an error.
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(Error::sidecar(
                self.error.as_deref().unwrap_or("request failed"),
            ))
        }
    }
}

impl SidecarMessage {
    /// The session-facing signal this frame carries, if any.
    #[must_use]
    pub fn into_signal(self) -> Option<ClientSignal> {
        match self {
            Self::Qr { qr } => Some(ClientSignal::QrReceived { qr }),
            Self::Ready { phone_number } => Some(ClientSignal::Ready { phone_number }),
            Self::AuthFailure { message } => Some(ClientSignal::AuthFailure { message }),
            Self::Disconnected { reason } => Some(ClientSignal::Disconnected { reason }),
            Self::Message(message) => Some(ClientSignal::InboundMessage(message)),
            Self::MessageAck { message_id, ack } => {
                Some(ClientSignal::MessageAck { message_id, ack })
            },
            Self::Response(_) | Self::Error { .. } => None,
        }
    }
}
