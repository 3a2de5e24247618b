//! Integration tests for the HTTP facade against a mock WhatsApp client.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    serde_json::Value,
    tokio::{net::TcpListener, sync::oneshot},
};

use {
    wabridge_config::{WabridgeConfig, WhatsAppConfig},
    wabridge_gateway::{AppState, build_app, serve_session_until},
    wabridge_whatsapp::{
        ClientConnector, ClientSignal, Error, LaunchOptions, MessageDescriptor, OutgoingContent,
        Result, Session, SessionOptions, SignalSender, WebClient,
    },
};

#[derive(Default)]
struct RecordingClient {
    sent: Mutex<Vec<(String, OutgoingContent)>>,
    destroyed: Mutex<u32>,
    reject: bool,
}

#[async_trait]
impl WebClient for RecordingClient {
    async fn send_message(
        &self,
        chat_id: &str,
        content: OutgoingContent,
    ) -> Result<MessageDescriptor> {
        if self.reject {
            return Err(Error::send_failed(chat_id, "invalid wid"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), content));
        Ok(MessageDescriptor {
            id: format!("true_{chat_id}_3EB0"),
            timestamp: None,
        })
    }

    async fn destroy(&self) -> Result<()> {
        *self.destroyed.lock().unwrap() += 1;
        Ok(())
    }
}

#[derive(Default)]
struct MockConnector {
    client: Arc<RecordingClient>,
    signals: Mutex<Option<SignalSender>>,
    fail: bool,
}

#[async_trait]
impl ClientConnector for MockConnector {
    async fn connect(
        &self,
        _launch: &LaunchOptions,
        signals: SignalSender,
    ) -> Result<Arc<dyn WebClient>> {
        if self.fail {
            return Err(Error::startup("browser failed to launch"));
        }
        *self.signals.lock().unwrap() = Some(signals);
        Ok(Arc::clone(&self.client) as Arc<dyn WebClient>)
    }
}

struct TestGateway {
    addr: SocketAddr,
    connector: Arc<MockConnector>,
    http: reqwest::Client,
}

impl TestGateway {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    fn sent(&self) -> Vec<(String, OutgoingContent)> {
        self.connector.client.sent.lock().unwrap().clone()
    }

    async fn send(&self, body: Value) -> (u16, Value) {
        let resp = self
            .http
            .post(self.url("/webhook/send"))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

async fn start_gateway(connector: MockConnector, ready: bool) -> TestGateway {
    let connector = Arc::new(connector);
    let session = Arc::new(Session::new(
        Arc::clone(&connector) as Arc<dyn ClientConnector>,
        SessionOptions::from(&WhatsAppConfig::default()),
    ));
    session.initialize().await.unwrap();
    if ready {
        connector
            .signals
            .lock()
            .unwrap()
            .as_ref()
            .unwrap()
            .send(ClientSignal::Ready { phone_number: None })
            .unwrap();
        session
            .wait_for_ready(Some(Duration::from_secs(2)))
            .await
            .unwrap();
    }

    let app = build_app(AppState::new(session), 1024 * 1024);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestGateway {
        addr,
        connector,
        http: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn health_reports_readiness() {
    let gw = start_gateway(MockConnector::default(), false).await;
    let body: Value = gw
        .http
        .get(gw.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["whatsappReady"], false);
    assert!(body["timestamp"].as_str().is_some_and(|t| t.contains('T')));

    let gw = start_gateway(MockConnector::default(), true).await;
    let body: Value = gw
        .http
        .get(gw.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["whatsappReady"], true);
}

#[tokio::test]
async fn missing_message_is_bad_request() {
    let gw = start_gateway(MockConnector::default(), true).await;

    let (status, body) = gw.send(serde_json::json!({ "phoneNumber": "+1 234" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "phoneNumber and message are required");

    let (status, _) = gw
        .send(serde_json::json!({ "phoneNumber": "", "message": "hi" }))
        .await;
    assert_eq!(status, 400);
    assert!(gw.sent().is_empty());
}

#[tokio::test]
async fn invalid_json_is_bad_request() {
    let gw = start_gateway(MockConnector::default(), true).await;
    let resp = gw
        .http
        .post(gw.url("/webhook/send"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(gw.sent().is_empty());
}

#[tokio::test]
async fn not_ready_is_service_unavailable() {
    let gw = start_gateway(MockConnector::default(), false).await;
    let (status, body) = gw
        .send(serde_json::json!({ "phoneNumber": "1234", "message": "hi" }))
        .await;
    assert_eq!(status, 503);
    assert_eq!(body["success"], false);
    assert_eq!(body["ready"], false);
    assert!(gw.sent().is_empty());
}

#[tokio::test]
async fn text_message_is_sent_to_normalized_chat() {
    let gw = start_gateway(MockConnector::default(), true).await;
    let (status, body) = gw
        .send(serde_json::json!({ "phoneNumber": "+1 (234) 567-890", "message": "hello" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["chatId"], "1234567890@c.us");
    assert_eq!(body["messageId"], "true_1234567890@c.us_3EB0");

    let sent = gw.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "1234567890@c.us");
    assert_eq!(sent[0].1, OutgoingContent::Text {
        body: "hello".into()
    });
}

#[tokio::test]
async fn image_routes_to_media_with_message_as_caption() {
    let gw = start_gateway(MockConnector::default(), true).await;
    let (status, body) = gw
        .send(serde_json::json!({
            "phoneNumber": "1234",
            "message": "look at this",
            "imageBase64": "aGVsbG8="
        }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["chatId"], "1234@c.us");
    assert_eq!(body["messageId"], "true_1234@c.us_3EB0");
    assert!(body["timestamp"].as_str().is_some());

    let (status, _) = gw
        .send(serde_json::json!({
            "phoneNumber": "1234",
            "message": "fallback",
            "imageBase64": "aGVsbG8=",
            "caption": "explicit"
        }))
        .await;
    assert_eq!(status, 200);

    let captions: Vec<Option<String>> = gw
        .sent()
        .into_iter()
        .map(|(_, content)| match content {
            OutgoingContent::Media(media) => {
                assert_eq!(media.mimetype, "image/jpeg");
                media.caption
            },
            other => panic!("expected media, got {other:?}"),
        })
        .collect();
    assert_eq!(captions, vec![
        Some("look at this".to_string()),
        Some("explicit".to_string())
    ]);
}

#[tokio::test]
async fn send_failure_is_internal_error() {
    let gw = start_gateway(
        MockConnector {
            client: Arc::new(RecordingClient {
                reject: true,
                ..Default::default()
            }),
            ..Default::default()
        },
        true,
    )
    .await;
    let (status, body) = gw
        .send(serde_json::json!({ "phoneNumber": "1234", "message": "hi" }))
        .await;
    assert_eq!(status, 500);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("invalid wid"));
}

#[tokio::test]
async fn invalid_base64_is_internal_error() {
    let gw = start_gateway(MockConnector::default(), true).await;
    let (status, body) = gw
        .send(serde_json::json!({
            "phoneNumber": "1234",
            "message": "hi",
            "imageBase64": "%%%"
        }))
        .await;
    assert_eq!(status, 500);
    assert_eq!(body["success"], false);
    assert!(gw.sent().is_empty());
}

#[tokio::test]
async fn status_exposes_phase() {
    let gw = start_gateway(MockConnector::default(), false).await;
    gw.connector
        .signals
        .lock()
        .unwrap()
        .as_ref()
        .unwrap()
        .send(ClientSignal::QrReceived {
            qr: "2@abc".into(),
        })
        .unwrap();

    let mut body = Value::Null;
    for _ in 0..50 {
        body = gw
            .http
            .get(gw.url("/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if body["phase"] == "awaiting_qr" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(body["phase"], "awaiting_qr");
    assert_eq!(body["qr"], "2@abc");
    assert_eq!(body["ready"], false);
    assert_eq!(body["consecutiveDisconnects"], 0);
}

fn local_config() -> WabridgeConfig {
    let mut config = WabridgeConfig::default();
    config.server.bind = "127.0.0.1".into();
    config.server.port = 0;
    config.whatsapp.startup_ready_timeout_ms = 60_000;
    config
}

fn session_for(connector: &Arc<MockConnector>) -> Arc<Session> {
    Arc::new(Session::new(
        Arc::clone(connector) as Arc<dyn ClientConnector>,
        SessionOptions::from(&WhatsAppConfig::default()),
    ))
}

#[tokio::test]
async fn failed_startup_still_serves_health() {
    let connector = Arc::new(MockConnector {
        fail: true,
        ..Default::default()
    });
    let session = session_for(&connector);
    let config = local_config();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let (bound_tx, bound_rx) = oneshot::channel();
    let server = tokio::spawn(async move {
        serve_session_until(
            &config,
            session,
            async move {
                let _ = stop_rx.await;
            },
            Some(bound_tx),
        )
        .await
    });

    let addr = tokio::time::timeout(Duration::from_secs(5), bound_rx)
        .await
        .expect("server never started listening")
        .unwrap();
    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["whatsappReady"], false);

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn shutdown_during_startup_tears_session_down() {
    let connector = Arc::new(MockConnector::default());
    let session = session_for(&connector);
    let config = local_config();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let (bound_tx, bound_rx) = oneshot::channel();
    let server = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            serve_session_until(
                &config,
                session,
                async move {
                    let _ = stop_rx.await;
                },
                Some(bound_tx),
            )
            .await
        })
    };

    // Connected but never authenticated: the readiness wait is pending.
    for _ in 0..100 {
        if session.snapshot().has_handle {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(session.snapshot().has_handle);

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("shutdown did not interrupt the readiness wait")
        .unwrap()
        .unwrap();

    assert_eq!(*connector.client.destroyed.lock().unwrap(), 1);
    assert!(!session.snapshot().has_handle);
    assert!(bound_rx.await.is_err());
}
