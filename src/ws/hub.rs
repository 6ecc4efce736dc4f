//! Outbound message routing to connected sessions

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::game::ConnectionId;
use crate::ws::protocol::ServerMsg;

/// Per-connection outbound queues.
///
/// `send` never waits, so it is safe to call while a match lock is held. Delivery is
/// at-most-once: a full or closed queue drops the message.
pub struct SessionHub {
    sessions: DashMap<ConnectionId, mpsc::Sender<ServerMsg>>,
    capacity: usize,
}

impl SessionHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Open the outbound queue for a new connection
    pub fn register(&self, connection: ConnectionId) -> mpsc::Receiver<ServerMsg> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.sessions.insert(connection, tx);
        rx
    }

    pub fn unregister(&self, connection: ConnectionId) {
        self.sessions.remove(&connection);
    }

    /// Queue a message for one connection. Returns false if it was dropped.
    pub fn send(&self, connection: ConnectionId, msg: ServerMsg) -> bool {
        let Some(tx) = self.sessions.get(&connection).map(|s| s.value().clone()) else {
            debug!(connection_id = %connection, "No session for outbound message");
            return false;
        };

        match tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = %connection, "Outbound queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection_id = %connection, "Outbound queue closed");
                false
            }
        }
    }

    pub fn connections(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_send_reaches_registered_connection() {
        let hub = SessionHub::new(4);
        let conn = ConnectionId::new();
        let mut rx = hub.register(conn);

        assert!(hub.send(conn, ServerMsg::Pong { t: 7 }));
        let msg = assert_ok!(rx.try_recv());
        assert!(matches!(msg, ServerMsg::Pong { t: 7 }));
        assert_eq!(hub.connections(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_waiting() {
        let hub = SessionHub::new(1);
        let conn = ConnectionId::new();
        let mut rx = hub.register(conn);

        assert!(hub.send(conn, ServerMsg::Pong { t: 1 }));
        assert!(!hub.send(conn, ServerMsg::Pong { t: 2 }));
        assert!(matches!(assert_ok!(rx.try_recv()), ServerMsg::Pong { t: 1 }));
        assert_err!(rx.try_recv());
    }

    #[tokio::test]
    async fn test_unknown_or_closed_connection() {
        let hub = SessionHub::new(4);
        assert!(!hub.send(ConnectionId::new(), ServerMsg::ReturnedToLobby));

        let conn = ConnectionId::new();
        drop(hub.register(conn));
        assert!(!hub.send(conn, ServerMsg::ReturnedToLobby));

        hub.unregister(conn);
        assert_eq!(hub.connections(), 0);
    }
}
