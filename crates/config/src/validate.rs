//! Semantic validation of a loaded configuration.

use crate::schema::WabridgeConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "whatsapp.ready_timeout_ms"
    pub path: &'static str,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}: {}", self.severity, self.path, self.message)
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn push(&mut self, severity: Severity, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            message: message.into(),
        });
    }
}

/// Check values that parse fine but cannot work at runtime.
#[must_use]
pub fn validate(config: &WabridgeConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    let wa = &config.whatsapp;

    if config.server.bind.trim().is_empty() {
        result.push(Severity::Error, "server.bind", "bind address is empty");
    }
    if config.server.max_body_bytes == 0 {
        result.push(
            Severity::Error,
            "server.max_body_bytes",
            "body limit of 0 rejects every webhook request",
        );
    }
    if wa.session_dir.as_os_str().is_empty() {
        result.push(Severity::Error, "whatsapp.session_dir", "session directory is empty");
    }
    if wa.ready_timeout_ms == 0 {
        result.push(
            Severity::Error,
            "whatsapp.ready_timeout_ms",
            "timeout of 0 makes every wait fail",
        );
    }
    if wa.sidecar.request_timeout_ms == 0 {
        result.push(
            Severity::Error,
            "whatsapp.sidecar.request_timeout_ms",
            "timeout of 0 makes every request fail",
        );
    }
    if wa.sidecar.port == config.server.port {
        result.push(
            Severity::Error,
            "whatsapp.sidecar.port",
            format!("sidecar port {} collides with server.port", wa.sidecar.port),
        );
    }
    if !wa.headless {
        result.push(
            Severity::Warning,
            "whatsapp.headless",
            "a visible browser needs a display; servers usually run headless",
        );
    }
    for arg in &wa.browser_args {
        if !arg.starts_with("--") {
            result.push(
                Severity::Warning,
                "whatsapp.browser_args",
                format!("'{arg}' does not look like a browser flag"),
            );
        }
    }

    result
}
