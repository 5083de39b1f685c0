//! Client-side negotiation for huddle rooms and calls.
//!
//! Each remote participant gets one [`PeerLink`] running the "perfect
//! negotiation" pattern: both sides may offer at any time and the polite side
//! (the lower user id) yields on collision. The media stack sits behind
//! [`PeerTransport`]; [`PeerManager`] keeps the set of links in step with the
//! room and call events coming off the gateway.

pub mod error;
pub mod link;
pub mod manager;
pub mod transport;

pub use error::PeerError;
pub use link::{LinkScope, PeerLink, SignalingState};
pub use manager::PeerManager;
pub use transport::{ConnectionState, PeerTransport, SdpKind, TransportFactory};

#[cfg(test)]
pub(crate) mod mock;
