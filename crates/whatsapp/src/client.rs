//! Seam between the session and whatever drives the browser-based client.
//!
//! The production implementation is [`crate::sidecar::SidecarConnector`];
//! tests substitute recording fakes.

use std::sync::Arc;

use {async_trait::async_trait, tokio::sync::mpsc};

use crate::{
    error::Result,
    types::{ClientSignal, LaunchOptions, MessageDescriptor, OutgoingContent},
};

/// Where a client delivers its lifecycle and inbound signals.
pub type SignalSender = mpsc::UnboundedSender<ClientSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<ClientSignal>;

/// Constructs and starts an external client.
#[async_trait]
pub trait ClientConnector: Send + Sync {
    /// Build the client with the given launch options and run its connect
    /// sequence. Signals go to `signals` from this point on, including any
    /// emitted before this call returns.
    async fn connect(
        &self,
        launch: &LaunchOptions,
        signals: SignalSender,
    ) -> Result<Arc<dyn WebClient>>;
}

/// A started external client.
#[async_trait]
pub trait WebClient: Send + Sync {
    async fn send_message(
        &self,
        chat_id: &str,
        content: OutgoingContent,
    ) -> Result<MessageDescriptor>;

    /// Tear the client down. The handle is unusable afterwards.
    async fn destroy(&self) -> Result<()>;
}
