use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("link to {0} is closed")]
    Closed(String),
}
