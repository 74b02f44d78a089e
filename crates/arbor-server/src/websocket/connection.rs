//! Per-connection state.

use parking_lot::RwLock;
use tokio::sync::mpsc;

/// One connected WebSocket client.
///
/// Outbound frames go through a bounded channel drained by the connection's
/// writer task; `send` never blocks the caller.
pub struct ClientConnection {
    /// Connection ID.
    pub id: String,
    outbound: mpsc::Sender<String>,
    session_id: RwLock<Option<String>>,
}

impl ClientConnection {
    /// Create a connection over its outbound channel.
    pub fn new(id: String, outbound: mpsc::Sender<String>) -> Self {
        Self {
            id,
            outbound,
            session_id: RwLock::new(None),
        }
    }

    /// Bind this connection to a session for event fan-out.
    pub fn bind_session(&self, session_id: String) {
        *self.session_id.write() = Some(session_id);
    }

    /// The bound session, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    /// Queue a frame; returns whether it was accepted.
    pub fn send(&self, frame: String) -> bool {
        self.outbound.try_send(frame).is_ok()
    }
}
