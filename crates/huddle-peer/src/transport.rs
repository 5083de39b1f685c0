use async_trait::async_trait;

use crate::error::PeerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Connectivity as reported by the media stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// One media connection to one remote peer.
///
/// `create_offer` and `create_answer` also apply the result as the local
/// description and return its sdp.
#[async_trait]
pub trait PeerTransport: Send {
    async fn create_offer(&mut self, ice_restart: bool) -> Result<String, PeerError>;
    async fn create_answer(&mut self) -> Result<String, PeerError>;
    async fn set_remote_description(&mut self, kind: SdpKind, sdp: &str) -> Result<(), PeerError>;
    /// Discard a pending local offer.
    async fn rollback(&mut self) -> Result<(), PeerError>;
    async fn add_ice_candidate(&mut self, candidate: &str) -> Result<(), PeerError>;
    fn close(&mut self);
}

pub trait TransportFactory: Send {
    fn connect(&mut self, peer_id: &str) -> Box<dyn PeerTransport>;
}
