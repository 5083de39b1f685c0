//! Recording transport for tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::PeerError;
use crate::transport::{PeerTransport, SdpKind, TransportFactory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    CreateOffer { ice_restart: bool },
    CreateAnswer,
    SetRemote(SdpKind, String),
    Rollback,
    AddCandidate(String),
    Close,
}

#[derive(Default)]
struct Recorded {
    calls: Vec<TransportCall>,
    offers: u32,
    answers: u32,
    fail_offers: bool,
    fail_answers: bool,
    fail_candidates: bool,
}

/// Clones share one log, so a test can keep a handle after boxing one.
#[derive(Clone)]
pub struct MockTransport {
    name: String,
    inner: Arc<Mutex<Recorded>>,
}

impl MockTransport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: Arc::new(Mutex::new(Recorded::default())),
        }
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.inner.lock().calls.clone()
    }

    pub fn fail_offers(&self) {
        self.inner.lock().fail_offers = true;
    }

    pub fn fail_answers(&self) {
        self.inner.lock().fail_answers = true;
    }

    pub fn fail_candidates(&self) {
        self.inner.lock().fail_candidates = true;
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_offer(&mut self, ice_restart: bool) -> Result<String, PeerError> {
        let mut inner = self.inner.lock();
        if inner.fail_offers {
            return Err(PeerError::Transport("offer failed".into()));
        }
        inner.calls.push(TransportCall::CreateOffer { ice_restart });
        inner.offers += 1;
        Ok(format!("{}-offer-{}", self.name, inner.offers))
    }

    async fn create_answer(&mut self) -> Result<String, PeerError> {
        let mut inner = self.inner.lock();
        if inner.fail_answers {
            return Err(PeerError::Transport("answer failed".into()));
        }
        inner.calls.push(TransportCall::CreateAnswer);
        inner.answers += 1;
        Ok(format!("{}-answer-{}", self.name, inner.answers))
    }

    async fn set_remote_description(&mut self, kind: SdpKind, sdp: &str) -> Result<(), PeerError> {
        self.inner.lock().calls.push(TransportCall::SetRemote(kind, sdp.to_string()));
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), PeerError> {
        self.inner.lock().calls.push(TransportCall::Rollback);
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: &str) -> Result<(), PeerError> {
        let mut inner = self.inner.lock();
        if inner.fail_candidates {
            return Err(PeerError::Transport("bad candidate".into()));
        }
        inner.calls.push(TransportCall::AddCandidate(candidate.to_string()));
        Ok(())
    }

    fn close(&mut self) {
        self.inner.lock().calls.push(TransportCall::Close);
    }
}

/// Hands out one [`MockTransport`] per remote peer, named after the local user.
#[derive(Clone)]
pub struct MockFactory {
    local_id: String,
    transports: Arc<Mutex<HashMap<String, MockTransport>>>,
}

impl MockFactory {
    pub fn new(local_id: &str) -> Self {
        Self {
            local_id: local_id.to_string(),
            transports: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn transport(&self, peer_id: &str) -> MockTransport {
        self.transports
            .lock()
            .get(peer_id)
            .cloned()
            .unwrap_or_else(|| panic!("no transport for {peer_id}"))
    }

    pub fn connected(&self) -> usize {
        self.transports.lock().len()
    }
}

impl TransportFactory for MockFactory {
    fn connect(&mut self, peer_id: &str) -> Box<dyn PeerTransport> {
        let transport = MockTransport::new(&self.local_id);
        self.transports
            .lock()
            .insert(peer_id.to_string(), transport.clone());
        Box::new(transport)
    }
}
