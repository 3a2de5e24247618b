//! WhatsApp Web session for wabridge.
//!
//! A [`Session`] owns one browser-based WhatsApp Web client, tracks its
//! authentication lifecycle and gates outgoing messages on readiness. The
//! production client runs in a Node.js sidecar reached over a local
//! WebSocket; anything implementing [`ClientConnector`] can stand in for it.

pub mod client;
pub mod error;
pub mod media;
pub mod process;
pub mod protocol;
pub mod session;
pub mod sidecar;
pub mod state;
pub mod types;

pub use {
    client::{ClientConnector, SignalReceiver, SignalSender, WebClient},
    error::{Error, Result},
    media::{DEFAULT_MIMETYPE, MediaPayload, mime_for_path},
    session::{Session, SessionOptions},
    sidecar::{SidecarClient, SidecarConnector},
    state::{SessionPhase, SessionState},
    types::{
        ACK_READ, CHAT_ID_SUFFIX, ClientSignal, InboundEvent, InboundMessage, LaunchOptions,
        MessageDescriptor, OutgoingContent, get_chat_id,
    },
};
