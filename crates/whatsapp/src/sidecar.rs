//! Sidecar-backed client: talks to the Node.js process hosting WhatsApp Web
//! over a local WebSocket.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    tokio::{
        net::TcpStream,
        sync::{Mutex, mpsc, oneshot},
    },
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use wabridge_config::SidecarConfig;

use crate::{
    client::{ClientConnector, SignalSender, WebClient},
    error::{Error, Result},
    process::{SidecarLaunch, SidecarProcess, find_sidecar_dir, start_sidecar},
    protocol::{GatewayMessage, SidecarMessage, SidecarResponse},
    types::{ClientSignal, LaunchOptions, MessageDescriptor, OutgoingContent},
};

const RETRY_DELAY: Duration = Duration::from_millis(500);

type SidecarStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<SidecarResponse>>>>;

/// Starts (or attaches to) the sidecar and opens a client session on it.
pub struct SidecarConnector {
    config: SidecarConfig,
}

impl SidecarConnector {
    pub fn new(config: SidecarConfig) -> Self {
        Self { config }
    }

    fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.config.port)
    }
}

#[async_trait]
impl ClientConnector for SidecarConnector {
    async fn connect(
        &self,
        launch: &LaunchOptions,
        signals: SignalSender,
    ) -> Result<Arc<dyn WebClient>> {
        let mut process = if self.config.auto_start {
            let sidecar_dir = find_sidecar_dir(self.config.dir.as_deref())?;
            Some(
                start_sidecar(SidecarLaunch {
                    sidecar_dir,
                    port: self.config.port,
                    session_dir: launch.session_dir.clone(),
                })
                .await?,
            )
        } else {
            debug!(port = self.config.port, "attaching to externally managed sidecar");
            None
        };

        let ws = match connect_with_retry(&self.url(), self.config.connect_retries).await {
            Ok(ws) => ws,
            Err(e) => {
                if let Some(process) = process.as_mut() {
                    process.stop().await;
                }
                return Err(e);
            },
        };

        let client = SidecarClient::spawn(
            ws,
            signals,
            Duration::from_millis(self.config.request_timeout_ms),
            process,
        );

        let response = client
            .request(GatewayMessage::Initialize {
                request_id: new_request_id(),
                session_dir: launch.session_dir.clone(),
                headless: launch.headless,
                browser_args: launch.browser_args.clone(),
            })
            .await
            .and_then(|r| r.into_result());

        if let Err(e) = response {
            let _ = client.destroy().await;
            return Err(Error::startup(e));
        }

        info!(url = %self.url(), "connected to WhatsApp sidecar");
        Ok(client)
    }
}

/// Open the sidecar socket, retrying with a linearly growing delay while the
/// process is still starting.
pub async fn connect_with_retry(url: &str, attempts: u32) -> Result<SidecarStream> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match connect_async(url).await {
            Ok((ws, _response)) => return Ok(ws),
            Err(e) => {
                debug!(url, attempt, error = %e, "sidecar not reachable yet");
                last_error = Some(e);
            },
        }
        if attempt < attempts {
            tokio::time::sleep(RETRY_DELAY * attempt).await;
        }
    }

    Err(Error::sidecar(format!(
        "could not connect to {url} after {attempts} attempts: {}",
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// A connected sidecar session.
pub struct SidecarClient {
    write_tx: mpsc::UnboundedSender<Message>,
    pending: PendingMap,
    closing: Arc<AtomicBool>,
    request_timeout: Duration,
    process: Mutex<Option<SidecarProcess>>,
}

impl SidecarClient {
    /// Start the reader and writer tasks for `ws`.
    pub fn spawn(
        ws: SidecarStream,
        signals: SignalSender,
        request_timeout: Duration,
        process: Option<SidecarProcess>,
    ) -> Arc<Self> {
        let (sink, stream) = ws.split();
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let pending = PendingMap::default();
        let closing = Arc::new(AtomicBool::new(false));

        tokio::spawn(write_loop(sink, write_rx));
        tokio::spawn(read_loop(
            stream,
            signals,
            Arc::clone(&pending),
            Arc::clone(&closing),
            write_tx.clone(),
        ));

        Arc::new(Self {
            write_tx,
            pending,
            closing,
            request_timeout,
            process: Mutex::new(process),
        })
    }

    /// Send a frame and wait for the response carrying its `request_id`.
    pub async fn request(&self, frame: GatewayMessage) -> Result<SidecarResponse> {
        let request_id = frame.request_id().to_string();
        let json = serde_json::to_string(&frame)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);

        if self.write_tx.send(Message::Text(json.into())).is_err() {
            self.pending.lock().await.remove(&request_id);
            return Err(Error::sidecar("connection closed"));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::sidecar("connection closed before response")),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(Error::sidecar(format!(
                    "request timed out after {}ms",
                    self.request_timeout.as_millis()
                )))
            },
        }
    }
}

#[async_trait]
impl WebClient for SidecarClient {
    async fn send_message(
        &self,
        chat_id: &str,
        content: OutgoingContent,
    ) -> Result<MessageDescriptor> {
        let response = self
            .request(GatewayMessage::SendMessage {
                request_id: new_request_id(),
                chat_id: chat_id.to_string(),
                content,
            })
            .await?;

        if !response.success {
            return Err(Error::send_failed(
                chat_id,
                response.error.as_deref().unwrap_or("unknown error"),
            ));
        }
        let Some(id) = response.message_id else {
            return Err(Error::send_failed(chat_id, "response carried no message id"));
        };
        Ok(MessageDescriptor {
            id,
            timestamp: response.timestamp,
        })
    }

    async fn destroy(&self) -> Result<()> {
        self.closing.store(true, Ordering::SeqCst);

        let result = self
            .request(GatewayMessage::Destroy {
                request_id: new_request_id(),
            })
            .await
            .and_then(|r| r.into_result());
        let _ = self.write_tx.send(Message::Close(None));

        if let Some(mut process) = self.process.lock().await.take() {
            process.stop().await;
        }
        result.map(|_| ())
    }
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

async fn write_loop(
    mut sink: futures::stream::SplitSink<SidecarStream, Message>,
    mut write_rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = write_rx.recv().await {
        let close = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            debug!(error = %e, "sidecar write failed");
            break;
        }
        if close {
            break;
        }
    }
}

async fn read_loop(
    mut stream: futures::stream::SplitStream<SidecarStream>,
    signals: SignalSender,
    pending: PendingMap,
    closing: Arc<AtomicBool>,
    write_tx: mpsc::UnboundedSender<Message>,
) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<SidecarMessage>(&text) {
                Ok(SidecarMessage::Response(response)) => {
                    match pending.lock().await.remove(&response.request_id) {
                        Some(tx) => {
                            let _ = tx.send(response);
                        },
                        None => debug!(request_id = %response.request_id, "unmatched response"),
                    }
                },
                Ok(SidecarMessage::Error { error }) => {
                    warn!(error = %error, "sidecar reported an error");
                },
                Ok(frame) => {
                    if let Some(signal) = frame.into_signal() {
                        let _ = signals.send(signal);
                    }
                },
                Err(e) => warn!(error = %e, "unparseable sidecar frame"),
            },
            Ok(Message::Ping(data)) => {
                let _ = write_tx.send(Message::Pong(data));
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {},
            Err(e) => {
                warn!(error = %e, "sidecar connection error");
                break;
            },
        }
    }

    // Dropping the senders fails every waiting request.
    pending.lock().await.clear();

    if !closing.load(Ordering::SeqCst) {
        let _ = signals.send(ClientSignal::Disconnected {
            reason: "sidecar connection closed".into(),
        });
    }
    debug!("sidecar reader stopped");
}
