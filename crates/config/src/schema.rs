//! Config schema: HTTP server, WhatsApp session, sidecar and logging.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Chromium flags the sidecar launches the headless browser with.
pub const DEFAULT_BROWSER_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--no-zygote",
    "--disable-gpu",
];

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WabridgeConfig {
    pub server: ServerConfig,
    pub whatsapp: WhatsAppConfig,
    pub logging: LoggingConfig,
}

/// HTTP facade configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "0.0.0.0".
    pub bind: String,
    /// Port to listen on. Defaults to 3000, overridden by `PORT`.
    pub port: u16,
    /// Maximum accepted request body, sized for base64-encoded images.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3000,
            max_body_bytes: 50 * 1024 * 1024,
        }
    }
}

/// WhatsApp Web session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    /// Directory where the client persists its authenticated session.
    pub session_dir: PathBuf,
    /// Run the browser without a window.
    pub headless: bool,
    /// Browser launch flags.
    pub browser_args: Vec<String>,
    /// Default timeout for `wait_for_ready` (ms).
    pub ready_timeout_ms: u64,
    /// How long the gateway waits for authentication before serving (ms).
    pub startup_ready_timeout_ms: u64,
    /// Consecutive disconnects after which the session is considered dead.
    /// `0` keeps waiting for reconnects forever.
    pub max_consecutive_disconnects: u32,
    pub sidecar: SidecarConfig,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            session_dir: PathBuf::from("./.session"),
            headless: true,
            browser_args: DEFAULT_BROWSER_ARGS.iter().map(|a| (*a).to_string()).collect(),
            ready_timeout_ms: 60_000,
            startup_ready_timeout_ms: 120_000,
            max_consecutive_disconnects: 5,
            sidecar: SidecarConfig::default(),
        }
    }
}

/// Node.js sidecar hosting the browser-based client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    /// Directory containing the sidecar's `package.json`. Discovered when unset.
    pub dir: Option<PathBuf>,
    /// Port the sidecar WebSocket server listens on.
    pub port: u16,
    /// Spawn and supervise the sidecar process. Disable to connect to one
    /// that is managed externally.
    pub auto_start: bool,
    /// Upper bound for a single request to the sidecar (ms).
    pub request_timeout_ms: u64,
    /// Connection attempts before giving up on the sidecar socket.
    pub connect_retries: u32,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            dir: None,
            port: 3101,
            auto_start: true,
            request_timeout_ms: 60_000,
            connect_retries: 10,
        }
    }
}

/// Console logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base filter directive (trace, debug, info, warn, error).
    pub level: String,
    /// Enable verbose output; also set by `DEBUG=true`.
    pub debug: bool,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            debug: false,
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Filter directive after applying the debug flag.
    #[must_use]
    pub fn effective_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.level
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = WabridgeConfig::default();
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert_eq!(cfg.whatsapp.session_dir, PathBuf::from("./.session"));
        assert_eq!(cfg.whatsapp.ready_timeout_ms, 60_000);
        assert_eq!(cfg.whatsapp.startup_ready_timeout_ms, 120_000);
        assert_eq!(cfg.whatsapp.browser_args.len(), DEFAULT_BROWSER_ARGS.len());
        assert!(cfg.whatsapp.headless);
        assert!(cfg.whatsapp.sidecar.auto_start);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: WabridgeConfig = toml::from_str(
            r#"
            [server]
            port = 8080

            [whatsapp]
            headless = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert!(!cfg.whatsapp.headless);
        assert_eq!(cfg.whatsapp.max_consecutive_disconnects, 5);
    }

    #[test]
    fn debug_flag_overrides_level() {
        let mut logging = LoggingConfig {
            level: "warn".into(),
            ..Default::default()
        };
        assert_eq!(logging.effective_level(), "warn");
        logging.debug = true;
        assert_eq!(logging.effective_level(), "debug");
    }
}
