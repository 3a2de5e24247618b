use std::sync::Arc;

use wabridge_whatsapp::Session;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
}

impl AppState {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}
