//! Shared types flowing between the session, the client seam and callers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use {crate::media::MediaPayload, wabridge_config::WhatsAppConfig};

/// Suffix WhatsApp Web uses for individual chat identifiers.
pub const CHAT_ID_SUFFIX: &str = "@c.us";

/// Build a chat identifier from a phone number in any human format.
///
/// Every non-digit character is dropped, so `"+1 (234) 567-890"` becomes
/// `"1234567890@c.us"`. An input without digits yields a bare suffix; the
/// caller owns that case.
#[must_use]
pub fn get_chat_id(phone_number: &str) -> String {
    let digits: String = phone_number.chars().filter(char::is_ascii_digit).collect();
    format!("{digits}{CHAT_ID_SUFFIX}")
}

/// How the external client is constructed and launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOptions {
    /// Directory for the local auth strategy's persisted session.
    pub session_dir: PathBuf,
    pub headless: bool,
    pub browser_args: Vec<String>,
}

impl From<&WhatsAppConfig> for LaunchOptions {
    fn from(config: &WhatsAppConfig) -> Self {
        Self {
            session_dir: config.session_dir.clone(),
            headless: config.headless,
            browser_args: config.browser_args.clone(),
        }
    }
}

/// Signals the external client emits. The session applies the lifecycle
/// ones to its state and republishes the inbound ones to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientSignal {
    QrReceived { qr: String },
    Ready { phone_number: Option<String> },
    AuthFailure { message: String },
    Disconnected { reason: String },
    InboundMessage(InboundMessage),
    MessageAck { message_id: String, ack: i32 },
}

/// Acknowledgement level the platform reports once a message was read.
pub const ACK_READ: i32 = 3;

/// Inbound traffic republished to session subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Message(InboundMessage),
    Ack { message_id: String, ack: i32 },
}

/// A message received by the connected account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    /// Sender chat identifier (`<digits>@c.us`).
    pub from: String,
    pub chat_id: String,
    #[serde(default)]
    pub chat_name: Option<String>,
    /// Push name of the sender, when the platform provides one.
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub body: String,
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(default)]
    pub media: Option<InboundMedia>,
}

impl InboundMessage {
    /// Sender's phone number without the chat suffix.
    #[must_use]
    pub fn sender_number(&self) -> &str {
        self.from.strip_suffix(CHAT_ID_SUFFIX).unwrap_or(&self.from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMedia {
    pub mimetype: String,
    #[serde(default)]
    pub filename: Option<String>,
}

/// What the external client returns for a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDescriptor {
    /// Serialized message id, e.g. `true_1234567890@c.us_3EB0...`.
    pub id: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Content handed to the external client's send call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutgoingContent {
    Text { body: String },
    Media(MediaPayload),
}
