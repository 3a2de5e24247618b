//! Session state and the transition function driven by client signals.

use serde::Serialize;

use crate::types::ClientSignal;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    /// Client constructed, connect sequence running.
    Initializing,
    /// A QR code is waiting to be scanned.
    AwaitingQr,
    /// Authentication was rejected; a new QR code may follow.
    AuthFailed,
    Ready,
    /// Lost the connection; the client may reconnect on its own.
    Disconnected,
    /// Too many consecutive disconnects. Only `destroy()` leaves this phase.
    Terminated,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::AwaitingQr => "awaiting_qr",
            Self::AuthFailed => "auth_failed",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Observable session state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub ready: bool,
    pub authenticated: bool,
    /// Whether a client handle is held.
    pub has_handle: bool,
    pub consecutive_disconnects: u32,
    /// Latest QR code, cleared once authenticated.
    pub qr: Option<String>,
    pub last_error: Option<String>,
    /// Bumped on every (re)initialization and teardown so that signals from
    /// an earlier client are recognised and dropped.
    pub generation: u64,
}

impl SessionState {
    /// Sends may be attempted.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready && self.has_handle
    }

    /// Start a new generation for a fresh client.
    pub fn begin_initialize(&mut self) {
        *self = Self {
            phase: SessionPhase::Initializing,
            generation: self.generation.wrapping_add(1),
            ..Self::default()
        };
    }

    pub fn attach_handle(&mut self) {
        self.has_handle = true;
    }

    /// The connect sequence failed; nothing is held.
    pub fn initialize_failed(&mut self, error: String) {
        *self = Self {
            last_error: Some(error),
            generation: self.generation.wrapping_add(1),
            ..Self::default()
        };
    }

    /// Explicit teardown: drop the handle and both flags.
    pub fn reset(&mut self) {
        *self = Self {
            generation: self.generation.wrapping_add(1),
            ..Self::default()
        };
    }

    /// Apply a lifecycle signal. Returns whether the state changed.
    ///
    /// `max_disconnects` of 0 never escalates to [`SessionPhase::Terminated`].
    pub fn apply(&mut self, signal: &ClientSignal, max_disconnects: u32) -> bool {
        if self.phase == SessionPhase::Terminated {
            return false;
        }

        match signal {
            ClientSignal::QrReceived { qr } => {
                self.phase = SessionPhase::AwaitingQr;
                self.ready = false;
                self.authenticated = false;
                self.qr = Some(qr.clone());
            },
            ClientSignal::Ready { .. } => {
                self.phase = SessionPhase::Ready;
                self.ready = true;
                self.authenticated = true;
                self.qr = None;
                self.consecutive_disconnects = 0;
                self.last_error = None;
            },
            ClientSignal::AuthFailure { message } => {
                self.phase = SessionPhase::AuthFailed;
                self.ready = false;
                self.authenticated = false;
                self.last_error = Some(format!("authentication failed: {message}"));
            },
            ClientSignal::Disconnected { reason } => {
                self.ready = false;
                self.consecutive_disconnects = self.consecutive_disconnects.saturating_add(1);
                self.last_error = Some(format!("disconnected: {reason}"));
                self.phase = if max_disconnects > 0 && self.consecutive_disconnects >= max_disconnects
                {
                    SessionPhase::Terminated
                } else {
                    SessionPhase::Disconnected
                };
            },
            ClientSignal::InboundMessage(_) | ClientSignal::MessageAck { .. } => return false,
        }
        true
    }
}
