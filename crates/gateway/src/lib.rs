//! HTTP facade over a WhatsApp session: health, status and the send webhook.

pub mod server;
pub mod state;
pub mod webhook;

pub use {
    server::{build_app, serve_session, serve_session_until, start_gateway},
    state::AppState,
};
