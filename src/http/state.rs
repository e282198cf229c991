use crate::session::SessionContext;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Collaborators cloned into every new session
    pub context: SessionContext,

    /// Number of sessions currently connected
    active_sessions: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(context: SessionContext) -> Self {
        Self {
            context,
            active_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    pub(crate) fn session_started(&self) {
        self.active_sessions.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn session_finished(&self) {
        self.active_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}
