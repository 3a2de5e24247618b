//! Session coordinator: owns the client handle, applies client signals to the
//! session state, and gates sends on readiness.

use std::{path::Path, sync::Arc, time::Duration};

use {
    tokio::sync::{Mutex, RwLock, broadcast, mpsc, watch},
    tracing::{debug, error, info, warn},
};

use wabridge_config::WhatsAppConfig;

use crate::{
    client::{ClientConnector, SignalReceiver, WebClient},
    error::{Error, Result},
    media::MediaPayload,
    sidecar::SidecarConnector,
    state::{SessionPhase, SessionState},
    types::{
        ClientSignal, InboundEvent, LaunchOptions, MessageDescriptor, OutgoingContent, get_chat_id,
    },
};

const INBOUND_CAPACITY: usize = 256;

/// Tunables for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub launch: LaunchOptions,
    /// Used by [`Session::wait_for_ready`] when no timeout is given.
    pub ready_timeout: Duration,
    /// `0` disables escalation to [`SessionPhase::Terminated`].
    pub max_consecutive_disconnects: u32,
}

impl From<&WhatsAppConfig> for SessionOptions {
    fn from(config: &WhatsAppConfig) -> Self {
        Self {
            launch: LaunchOptions::from(config),
            ready_timeout: Duration::from_millis(config.ready_timeout_ms),
            max_consecutive_disconnects: config.max_consecutive_disconnects,
        }
    }
}

/// The logical connection to WhatsApp Web.
///
/// Construct one per process (or per test) and share it behind an `Arc`.
pub struct Session {
    connector: Arc<dyn ClientConnector>,
    options: SessionOptions,
    handle: RwLock<Option<Arc<dyn WebClient>>>,
    /// Serializes `initialize` calls.
    init_lock: Mutex<()>,
    state: Arc<watch::Sender<SessionState>>,
    inbound: broadcast::Sender<InboundEvent>,
}

impl Session {
    pub fn new(connector: Arc<dyn ClientConnector>, options: SessionOptions) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let (inbound, _) = broadcast::channel(INBOUND_CAPACITY);
        Self {
            connector,
            options,
            handle: RwLock::new(None),
            init_lock: Mutex::new(()),
            state: Arc::new(state),
            inbound,
        }
    }

    /// Session backed by the Node.js sidecar described in `config`.
    pub fn with_sidecar(config: &WhatsAppConfig) -> Self {
        Self::new(
            Arc::new(SidecarConnector::new(config.sidecar.clone())),
            SessionOptions::from(config),
        )
    }

    /// Construct and start the external client.
    ///
    /// The signal consumer is registered before the client's connect
    /// sequence starts, so no early signal is lost. A QR code may be logged
    /// while this runs. Calling it again while a client is held returns the
    /// existing handle; a call made while another is connecting waits for
    /// that one and then returns its handle.
    ///
    /// The handle lock is not held while connecting, so sends and
    /// [`Session::destroy`] answer at once in the meantime.
    pub async fn initialize(&self) -> Result<Arc<dyn WebClient>> {
        let _initializing = self.init_lock.lock().await;
        if let Some(existing) = self.handle.read().await.clone() {
            warn!("WhatsApp client already initialized");
            return Ok(existing);
        }

        info!("initializing WhatsApp client");

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let mut generation = 0;
        self.state.send_modify(|s| {
            s.begin_initialize();
            generation = s.generation;
        });
        tokio::spawn(pump_signals(
            Arc::clone(&self.state),
            self.inbound.clone(),
            signal_rx,
            generation,
            self.options.max_consecutive_disconnects,
        ));

        let connected = self.connector.connect(&self.options.launch, signal_tx).await;

        let mut handle = self.handle.write().await;
        let current = self.state.borrow().generation == generation;
        match connected {
            Ok(client) if current => {
                *handle = Some(Arc::clone(&client));
                self.state.send_modify(SessionState::attach_handle);
                debug!(generation, "WhatsApp client started");
                Ok(client)
            },
            Ok(client) => {
                drop(handle);
                warn!(generation, "session destroyed while the client was starting");
                if let Err(e) = client.destroy().await {
                    warn!(error = %e, "teardown of the abandoned client failed");
                }
                Err(Error::startup("session destroyed while the client was starting"))
            },
            Err(e) => {
                error!(error = %e, "failed to initialize WhatsApp client");
                if current {
                    self.state
                        .send_modify(|s| s.initialize_failed(e.to_string()));
                }
                Err(e)
            },
        }
    }

    /// Authenticated and holding a client. Never blocks.
    #[must_use]
    pub fn is_client_ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    /// Chat identifier for a phone number, see [`get_chat_id`].
    #[must_use]
    pub fn get_chat_id(phone_number: &str) -> String {
        get_chat_id(phone_number)
    }

    /// Current state, for status reporting.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receive inbound messages and read receipts.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.inbound.subscribe()
    }

    /// Wait until the session is ready, up to `timeout` (the configured
    /// default when `None`). Returns at once when already ready.
    pub async fn wait_for_ready(&self, timeout: Option<Duration>) -> Result<()> {
        if self.is_client_ready() {
            return Ok(());
        }

        let timeout = timeout.unwrap_or(self.options.ready_timeout);
        let mut rx = self.state.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| s.is_ready() || s.phase == SessionPhase::Terminated),
        )
        .await;

        match waited {
            Ok(Ok(state)) if state.phase == SessionPhase::Terminated => Err(Error::Terminated {
                disconnects: state.consecutive_disconnects,
            }),
            Ok(Ok(_)) => Ok(()),
            // The sender lives as long as `self`, so a closed channel cannot
            // happen while waiting.
            Ok(Err(_)) | Err(_) => Err(Error::ReadyTimeout { timeout }),
        }
    }

    pub async fn send_text_message(&self, chat_id: &str, message: &str) -> Result<MessageDescriptor> {
        let client = self.ready_client(chat_id).await?;
        let result = client
            .send_message(chat_id, OutgoingContent::Text {
                body: message.to_string(),
            })
            .await;
        log_outcome("message", chat_id, result)
    }

    /// Send a file from disk with an optional caption.
    pub async fn send_media(
        &self,
        chat_id: &str,
        file_path: &Path,
        caption: Option<&str>,
    ) -> Result<MessageDescriptor> {
        let client = self.ready_client(chat_id).await?;
        let result = match MediaPayload::from_file_path(file_path).await {
            Ok(media) => {
                client
                    .send_message(chat_id, OutgoingContent::Media(media.with_caption(caption)))
                    .await
            },
            Err(e) => Err(e),
        };
        log_outcome("media", chat_id, result)
    }

    /// Send base64 media. `mimetype` defaults to `image/jpeg`.
    pub async fn send_media_base64(
        &self,
        chat_id: &str,
        data: &str,
        caption: Option<&str>,
        mimetype: Option<&str>,
        filename: Option<&str>,
    ) -> Result<MessageDescriptor> {
        let client = self.ready_client(chat_id).await?;
        let result = match MediaPayload::from_base64(mimetype, data, filename.map(str::to_string))
        {
            Ok(media) => {
                client
                    .send_message(chat_id, OutgoingContent::Media(media.with_caption(caption)))
                    .await
            },
            Err(e) => Err(e),
        };
        log_outcome("base64 media", chat_id, result)
    }

    /// Tear down the client and clear all state. A no-op without a client.
    ///
    /// State is cleared even when the client's own teardown fails; that
    /// error is still returned. Called while [`Session::initialize`] is still
    /// connecting, it returns at once and the client that connect produces
    /// is torn down instead of being kept.
    pub async fn destroy(&self) -> Result<()> {
        let mut handle = self.handle.write().await;
        let Some(client) = handle.take() else {
            debug!("destroy called without a client");
            self.state.send_if_modified(|s| {
                let starting = s.phase != SessionPhase::Uninitialized;
                if starting {
                    s.reset();
                }
                starting
            });
            return Ok(());
        };

        let result = client.destroy().await;
        self.state.send_modify(SessionState::reset);
        match &result {
            Ok(()) => info!("client destroyed"),
            Err(e) => warn!(error = %e, "client teardown failed, session state cleared"),
        }
        result
    }

    async fn ready_client(&self, chat_id: &str) -> Result<Arc<dyn WebClient>> {
        let Some(client) = self.handle.read().await.clone() else {
            warn!(chat_id, "send rejected, client not initialized");
            return Err(Error::NotInitialized);
        };
        if !self.is_client_ready() {
            warn!(chat_id, "send rejected, client not ready");
            return Err(Error::NotReady);
        }
        Ok(client)
    }
}

fn log_outcome(
    kind: &str,
    chat_id: &str,
    result: Result<MessageDescriptor>,
) -> Result<MessageDescriptor> {
    match &result {
        Ok(sent) => info!(chat_id, message_id = %sent.id, "{kind} sent"),
        Err(e) => error!(chat_id, error = %e, "failed to send {kind}"),
    }
    result
}

/// Apply client signals in emission order until the client goes away or a
/// newer generation takes over.
async fn pump_signals(
    state: Arc<watch::Sender<SessionState>>,
    inbound: broadcast::Sender<InboundEvent>,
    mut signals: SignalReceiver,
    generation: u64,
    max_disconnects: u32,
) {
    while let Some(signal) = signals.recv().await {
        if state.borrow().generation != generation {
            debug!(generation, "dropping signals from a replaced client");
            return;
        }

        match signal {
            ClientSignal::InboundMessage(message) => {
                debug!(from = %message.from, id = %message.id, "inbound message");
                // No subscribers is fine.
                let _ = inbound.send(InboundEvent::Message(message));
            },
            ClientSignal::MessageAck { message_id, ack } => {
                let _ = inbound.send(InboundEvent::Ack { message_id, ack });
            },
            lifecycle => {
                log_signal(&lifecycle);
                state.send_if_modified(|s| {
                    let changed = s.apply(&lifecycle, max_disconnects);
                    if changed && s.phase == SessionPhase::Terminated {
                        error!(
                            disconnects = s.consecutive_disconnects,
                            "giving up on the WhatsApp session, destroy and initialize to retry"
                        );
                    }
                    changed
                });
            },
        }
    }
    debug!(generation, "client signal stream closed");
}

fn log_signal(signal: &ClientSignal) {
    match signal {
        ClientSignal::QrReceived { qr } => {
            info!("QR code received, scan it with your phone");
            info!("open WhatsApp > Settings > Linked Devices > Link a Device and scan the code");
            info!(qr = %qr, "QR code payload");
        },
        ClientSignal::Ready { phone_number } => {
            info!(?phone_number, "WhatsApp client is ready to send and receive messages");
        },
        ClientSignal::AuthFailure { message } => {
            error!(message = %message, "authentication failed, scan the QR code again");
        },
        ClientSignal::Disconnected { reason } => {
            warn!(reason = %reason, "client disconnected");
        },
        ClientSignal::InboundMessage(_) | ClientSignal::MessageAck { .. } => {},
    }
}
