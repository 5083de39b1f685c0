use std::collections::VecDeque;

use huddle_models::gateway::{ClientEvent, IceSignal, SdpSignal, SignalScope};

use crate::error::PeerError;
use crate::transport::{ConnectionState, PeerTransport, SdpKind};

/// The room or call a link negotiates within.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkScope {
    Room(String),
    Call(String),
}

impl LinkScope {
    pub fn matches(&self, scope: SignalScope<'_>) -> bool {
        match (self, scope) {
            (Self::Room(ours), SignalScope::Room(theirs)) => ours == theirs,
            (Self::Call(ours), SignalScope::Call(theirs)) => ours == theirs,
            _ => false,
        }
    }

    fn ids(&self) -> (Option<String>, Option<String>) {
        match self {
            Self::Room(id) => (Some(id.clone()), None),
            Self::Call(id) => (None, Some(id.clone())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

/// An offer requested while another exchange was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PendingOffer {
    Negotiate,
    IceRestart,
}

/// Holds `making_offer` for the duration of an offer, on every exit path.
struct MakingOffer<'a>(&'a mut bool);

impl<'a> MakingOffer<'a> {
    fn set(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for MakingOffer<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

/// Negotiation state for one remote peer.
///
/// A link may serve several scopes at once (a room and a call with the same
/// user). Outbound signals carry the primary scope.
pub struct PeerLink {
    remote_id: String,
    scope: LinkScope,
    also: Vec<LinkScope>,
    polite: bool,
    state: SignalingState,
    making_offer: bool,
    ignore_offer: bool,
    has_remote_description: bool,
    pending_candidates: VecDeque<String>,
    pending_offer: Option<PendingOffer>,
    transport: Box<dyn PeerTransport>,
}

impl PeerLink {
    /// The side with the lower user id is polite.
    pub fn new(
        local_id: &str,
        remote_id: &str,
        scope: LinkScope,
        transport: Box<dyn PeerTransport>,
    ) -> Self {
        Self {
            remote_id: remote_id.to_string(),
            scope,
            also: Vec::new(),
            polite: local_id < remote_id,
            state: SignalingState::Stable,
            making_offer: false,
            ignore_offer: false,
            has_remote_description: false,
            pending_candidates: VecDeque::new(),
            pending_offer: None,
            transport,
        }
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub fn scope(&self) -> &LinkScope {
        &self.scope
    }

    /// Whether signals in `scope` belong to this link.
    pub fn serves(&self, scope: SignalScope<'_>) -> bool {
        self.scope.matches(scope) || self.also.iter().any(|held| held.matches(scope))
    }

    pub fn holds(&self, scope: &LinkScope) -> bool {
        self.scope == *scope || self.also.contains(scope)
    }

    pub fn add_scope(&mut self, scope: LinkScope) {
        if !self.holds(&scope) {
            tracing::debug!(peer_id = %self.remote_id, ?scope, "link shared with another scope");
            self.also.push(scope);
        }
    }

    /// Drop one scope, promoting the next held one. Returns false once none remain.
    pub fn remove_scope(&mut self, scope: &LinkScope) -> bool {
        if self.scope != *scope {
            self.also.retain(|held| held != scope);
            return true;
        }
        if self.also.is_empty() {
            return false;
        }
        self.scope = self.also.remove(0);
        true
    }

    pub fn is_polite(&self) -> bool {
        self.polite
    }

    pub fn signaling_state(&self) -> SignalingState {
        self.state
    }

    pub fn is_making_offer(&self) -> bool {
        self.making_offer
    }

    pub fn is_ignoring_offers(&self) -> bool {
        self.ignore_offer
    }

    pub fn queued_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Local media changed and a new offer is wanted.
    pub async fn negotiate(&mut self) -> Result<Option<ClientEvent>, PeerError> {
        self.make_offer(PendingOffer::Negotiate).await
    }

    pub async fn handle_offer(&mut self, sdp: &str) -> Result<Vec<ClientEvent>, PeerError> {
        if self.state == SignalingState::Closed {
            return Ok(Vec::new());
        }
        let collision = self.making_offer || self.state != SignalingState::Stable;
        self.ignore_offer = !self.polite && collision;
        if self.ignore_offer {
            tracing::debug!(peer_id = %self.remote_id, "ignoring colliding offer");
            return Ok(Vec::new());
        }

        if self.state == SignalingState::HaveLocalOffer {
            tracing::debug!(peer_id = %self.remote_id, "rolling back local offer");
            self.transport.rollback().await?;
            self.state = SignalingState::Stable;
        }
        self.transport.set_remote_description(SdpKind::Offer, sdp).await?;
        self.state = SignalingState::HaveRemoteOffer;
        let had_remote_description = std::mem::replace(&mut self.has_remote_description, true);

        let answer = match self.transport.create_answer().await {
            Ok(answer) => answer,
            Err(err) => {
                // Back out of the remote offer so the next exchange starts from Stable.
                if let Err(rollback_err) = self.transport.rollback().await {
                    tracing::debug!(peer_id = %self.remote_id, error = %rollback_err, "rollback after failed answer");
                }
                self.state = SignalingState::Stable;
                self.has_remote_description = had_remote_description;
                return Err(err);
            }
        };
        self.state = SignalingState::Stable;

        // The answer goes out whatever happens to the queued candidates.
        let mut out = vec![self.sdp_event(SdpKind::Answer, answer)];
        self.flush_candidates().await;
        self.resume_pending(&mut out).await;
        Ok(out)
    }

    pub async fn handle_answer(&mut self, sdp: &str) -> Result<Vec<ClientEvent>, PeerError> {
        if self.state != SignalingState::HaveLocalOffer {
            tracing::debug!(peer_id = %self.remote_id, state = ?self.state, "ignoring stale answer");
            return Ok(Vec::new());
        }
        self.transport.set_remote_description(SdpKind::Answer, sdp).await?;
        self.state = SignalingState::Stable;
        self.has_remote_description = true;
        self.flush_candidates().await;

        let mut out = Vec::new();
        self.resume_pending(&mut out).await;
        Ok(out)
    }

    /// Candidates that arrive before any remote description wait in order.
    pub async fn handle_candidate(&mut self, candidate: &str) -> Result<(), PeerError> {
        if self.state == SignalingState::Closed {
            return Ok(());
        }
        if !self.has_remote_description {
            self.pending_candidates.push_back(candidate.to_string());
            return Ok(());
        }
        self.apply_candidate(candidate).await
    }

    /// A failed or dropped connection is restarted, never torn down.
    pub async fn connection_state_changed(
        &mut self,
        state: ConnectionState,
    ) -> Result<Option<ClientEvent>, PeerError> {
        match state {
            ConnectionState::Failed | ConnectionState::Disconnected => {
                tracing::info!(peer_id = %self.remote_id, ?state, "restarting ice");
                self.make_offer(PendingOffer::IceRestart).await
            }
            _ => Ok(None),
        }
    }

    /// Wrap a locally gathered candidate for the relay.
    pub fn local_candidate(&self, candidate: &str) -> Option<ClientEvent> {
        if self.state == SignalingState::Closed {
            return None;
        }
        let (room_id, call_id) = self.scope.ids();
        Some(ClientEvent::SignalIce(IceSignal {
            peer_id: self.remote_id.clone(),
            room_id,
            call_id,
            candidate: candidate.to_string(),
        }))
    }

    pub fn close(&mut self) {
        if self.state == SignalingState::Closed {
            return;
        }
        self.state = SignalingState::Closed;
        self.pending_candidates.clear();
        self.pending_offer = None;
        self.transport.close();
        tracing::debug!(peer_id = %self.remote_id, "peer link closed");
    }

    async fn make_offer(&mut self, kind: PendingOffer) -> Result<Option<ClientEvent>, PeerError> {
        match self.state {
            SignalingState::Closed => return Err(PeerError::Closed(self.remote_id.clone())),
            SignalingState::Stable => {}
            SignalingState::HaveLocalOffer | SignalingState::HaveRemoteOffer => {
                // Retried once the current exchange settles.
                self.pending_offer = self.pending_offer.max(Some(kind));
                return Ok(None);
            }
        }

        let sdp = {
            let _making_offer = MakingOffer::set(&mut self.making_offer);
            self.transport
                .create_offer(kind == PendingOffer::IceRestart)
                .await?
        };
        self.state = SignalingState::HaveLocalOffer;
        Ok(Some(self.sdp_event(SdpKind::Offer, sdp)))
    }

    async fn resume_pending(&mut self, out: &mut Vec<ClientEvent>) {
        let Some(kind) = self.pending_offer.take() else {
            return;
        };
        match self.make_offer(kind).await {
            Ok(offer) => out.extend(offer),
            Err(err) => tracing::warn!(peer_id = %self.remote_id, error = %err, "deferred offer failed"),
        }
    }

    async fn apply_candidate(&mut self, candidate: &str) -> Result<(), PeerError> {
        match self.transport.add_ice_candidate(candidate).await {
            Ok(()) => Ok(()),
            Err(err) if self.ignore_offer => {
                tracing::debug!(peer_id = %self.remote_id, error = %err, "dropping candidate for ignored offer");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// A bad candidate is dropped; the rest of the queue still applies.
    async fn flush_candidates(&mut self) {
        while let Some(candidate) = self.pending_candidates.pop_front() {
            if let Err(err) = self.apply_candidate(&candidate).await {
                tracing::warn!(peer_id = %self.remote_id, error = %err, "dropping queued candidate");
            }
        }
    }

    fn sdp_event(&self, kind: SdpKind, sdp: String) -> ClientEvent {
        let (room_id, call_id) = self.scope.ids();
        let signal = SdpSignal {
            peer_id: self.remote_id.clone(),
            room_id,
            call_id,
            sdp,
        };
        match kind {
            SdpKind::Offer => ClientEvent::SignalOffer(signal),
            SdpKind::Answer => ClientEvent::SignalAnswer(signal),
        }
    }
}

impl Drop for PeerLink {
    fn drop(&mut self) {
        self.close();
    }
}
