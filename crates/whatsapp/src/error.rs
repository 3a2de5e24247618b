use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A send was attempted before `initialize()`.
    #[error("client not initialized, call initialize() first")]
    NotInitialized,

    /// A send was attempted before authentication completed.
    #[error("client is not ready, wait for authentication")]
    NotReady,

    #[error("client ready timeout after {}ms", .timeout.as_millis())]
    ReadyTimeout { timeout: Duration },

    /// The session gave up after repeated disconnects.
    #[error("session terminated after {disconnects} consecutive disconnects")]
    Terminated { disconnects: u32 },

    #[error("failed to send to {chat_id}: {message}")]
    SendFailed { chat_id: String, message: String },

    #[error("client startup failed: {message}")]
    Startup { message: String },

    #[error("invalid media: {message}")]
    Media { message: String },

    #[error("sidecar: {message}")]
    Sidecar { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
}

impl Error {
    #[must_use]
    pub fn startup(message: impl std::fmt::Display) -> Self {
        Self::Startup {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn media(message: impl std::fmt::Display) -> Self {
        Self::Media {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn sidecar(message: impl std::fmt::Display) -> Self {
        Self::Sidecar {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn send_failed(chat_id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::SendFailed {
            chat_id: chat_id.into(),
            message: message.to_string(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
