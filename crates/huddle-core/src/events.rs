use dashmap::DashMap;
use huddle_models::gateway::ServerEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Identifies one live transport connection.
pub type ConnId = u64;

pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

/// Per-connection outbound channels. Each connection's writer task drains its
/// receiver into the socket.
#[derive(Clone, Default)]
pub struct EventBus {
    outbound: Arc<DashMap<ConnId, mpsc::UnboundedSender<ServerEvent>>>,
    next_conn: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a connection id and its outbound channel.
    pub fn register(&self) -> (ConnId, EventReceiver) {
        let conn = self.next_conn.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound.insert(conn, tx);
        (conn, rx)
    }

    pub fn unregister(&self, conn: ConnId) {
        self.outbound.remove(&conn);
    }

    /// Returns false when the connection is gone.
    pub fn send(&self, conn: ConnId, event: ServerEvent) -> bool {
        match self.outbound.get(&conn) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn send_many<I>(&self, conns: I, event: &ServerEvent)
    where
        I: IntoIterator<Item = ConnId>,
    {
        for conn in conns {
            self.send(conn, event.clone());
        }
    }

    pub fn connection_count(&self) -> usize {
        self.outbound.len()
    }
}
