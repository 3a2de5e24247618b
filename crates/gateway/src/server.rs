use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        extract::{DefaultBodyLimit, State},
        response::{IntoResponse, Json},
        routing::{get, post},
    },
    tokio::sync::oneshot,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{error, info, warn},
};

use {
    wabridge_config::{Severity, WabridgeConfig, validate},
    wabridge_whatsapp::Session,
};

use crate::{state::AppState, webhook::send_handler};

/// Build the router (shared between production startup and tests).
pub fn build_app(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/webhook/send", post(send_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Validate the config, bring the session up and serve until SIGINT or
/// SIGTERM, then tear the session down.
pub async fn start_gateway(config: WabridgeConfig) -> anyhow::Result<()> {
    let validation = validate(&config);
    for diagnostic in &validation.diagnostics {
        match diagnostic.severity {
            Severity::Error => error!("{diagnostic}"),
            Severity::Warning => warn!("{diagnostic}"),
        }
    }
    if validation.has_errors() {
        anyhow::bail!("invalid configuration");
    }

    let session = Arc::new(Session::with_sidecar(&config.whatsapp));
    serve_session(&config, session).await
}

/// Startup sequence for an already constructed session, stopped by SIGINT
/// or SIGTERM.
pub async fn serve_session(config: &WabridgeConfig, session: Arc<Session>) -> anyhow::Result<()> {
    serve_session_until(config, session, shutdown_signal(), None).await
}

/// Startup sequence with a caller-provided shutdown future.
///
/// A failed initialization or readiness wait is logged and the server still
/// listens, so `/health` can report the state. `shutdown` is watched from the
/// start: if it fires while the session is still coming up, the session is
/// torn down and nothing is served. `bound` receives the listening address.
pub async fn serve_session_until(
    config: &WabridgeConfig,
    session: Arc<Session>,
    shutdown: impl Future<Output = ()> + Send + 'static,
    bound: Option<oneshot::Sender<SocketAddr>>,
) -> anyhow::Result<()> {
    let mut shutdown = Box::pin(shutdown);
    let startup_timeout = Duration::from_millis(config.whatsapp.startup_ready_timeout_ms);

    let ready = tokio::select! {
        outcome = bring_up(&session, startup_timeout) => match outcome {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "failed to bring up the WhatsApp client");
                false
            },
        },
        () = &mut shutdown => {
            info!("shutdown requested during startup");
            teardown(&session).await;
            return Ok(());
        },
    };

    let listener =
        tokio::net::TcpListener::bind((config.server.bind.as_str(), config.server.port)).await?;
    let addr = listener.local_addr()?;
    let port = addr.port();

    if ready {
        info!("server running on http://{addr}");
        info!("health: http://localhost:{port}/health");
        info!("webhook: http://localhost:{port}/webhook/send");
    } else {
        warn!(port, "server started but WhatsApp client not ready");
        info!("check the logs for a QR code to authenticate");
    }
    if let Some(bound) = bound {
        let _ = bound.send(addr);
    }

    let app = build_app(
        AppState::new(Arc::clone(&session)),
        config.server.max_body_bytes,
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("shutting down gracefully");
    teardown(&session).await;
    Ok(())
}

async fn teardown(session: &Session) {
    if let Err(e) = session.destroy().await {
        warn!(error = %e, "session teardown failed");
    }
}

async fn bring_up(session: &Session, timeout: Duration) -> wabridge_whatsapp::Result<()> {
    info!("starting WhatsApp client");
    session.initialize().await?;
    info!("waiting for WhatsApp authentication");
    session.wait_for_ready(Some(timeout)).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "whatsappReady": state.session.is_client_ready(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.session.snapshot();
    Json(serde_json::json!({
        "phase": snapshot.phase,
        "ready": snapshot.is_ready(),
        "authenticated": snapshot.authenticated,
        "qr": snapshot.qr,
        "lastError": snapshot.last_error,
        "consecutiveDisconnects": snapshot.consecutive_disconnects,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
