use std::collections::{BTreeSet, HashMap};

use huddle_models::call::CallState;
use huddle_models::gateway::{ClientEvent, ServerEvent, SignalScope};
use huddle_models::room::HostAction;

use crate::error::PeerError;
use crate::link::{LinkScope, PeerLink};
use crate::transport::{ConnectionState, TransportFactory};

/// Owns every [`PeerLink`] of one session, keyed by remote user id.
///
/// Feed it the server events the session receives; it returns the signals to
/// send back. Links follow the current room's participant list and the
/// session's connected calls. A link shared by a room and a call closes only
/// when it leaves both.
pub struct PeerManager<F> {
    local_id: String,
    factory: F,
    links: HashMap<String, PeerLink>,
    room_id: Option<String>,
    /// Other party of each known call.
    call_peers: HashMap<String, String>,
}

impl<F: TransportFactory> PeerManager<F> {
    pub fn new(local_id: impl Into<String>, factory: F) -> Self {
        Self {
            local_id: local_id.into(),
            factory,
            links: HashMap::new(),
            room_id: None,
            call_peers: HashMap::new(),
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn link(&self, peer_id: &str) -> Option<&PeerLink> {
        self.links.get(peer_id)
    }

    /// Remote ids with a live link, sorted.
    pub fn peers(&self) -> Vec<&str> {
        let mut peers: Vec<&str> = self.links.keys().map(String::as_str).collect();
        peers.sort_unstable();
        peers
    }

    /// Remember the callee of an outgoing invite; `call.state` only names the call.
    pub fn track_call(&mut self, call_id: &str, peer_id: &str) {
        self.call_peers.insert(call_id.to_string(), peer_id.to_string());
    }

    pub async fn handle_event(&mut self, event: &ServerEvent) -> Result<Vec<ClientEvent>, PeerError> {
        let mut out = Vec::new();
        match event {
            ServerEvent::RoomJoined(joined) => {
                let room_id = joined.room.room_id.clone();
                if self.room_id.as_deref() != Some(room_id.as_str()) {
                    self.leave_room();
                }
                self.room_id = Some(room_id.clone());

                let wanted: BTreeSet<&str> = joined
                    .participants
                    .iter()
                    .map(|p| p.user_id.as_str())
                    .filter(|id| *id != self.local_id)
                    .collect();
                let room_scope = LinkScope::Room(room_id.clone());
                let stale: Vec<String> = self
                    .links
                    .iter()
                    .filter(|(id, link)| link.holds(&room_scope) && !wanted.contains(id.as_str()))
                    .map(|(id, _)| id.clone())
                    .collect();
                for peer_id in stale {
                    self.release(&peer_id, &room_scope);
                }
                for peer_id in wanted {
                    self.open_link(peer_id, LinkScope::Room(room_id.clone()), &mut out)
                        .await;
                }
            }
            ServerEvent::RoomParticipantJoined(joined) => {
                if self.in_room(&joined.room_id) && joined.user.user_id != self.local_id {
                    let scope = LinkScope::Room(joined.room_id.clone());
                    self.open_link(&joined.user.user_id, scope, &mut out).await;
                }
            }
            ServerEvent::RoomParticipantLeft(left) => {
                if !self.in_room(&left.room_id) {
                    return Ok(out);
                }
                if left.user_id == self.local_id {
                    self.leave_room();
                } else {
                    self.release(&left.user_id, &LinkScope::Room(left.room_id.clone()));
                }
            }
            ServerEvent::RoomHostAction(notice) => {
                if notice.action == HostAction::Kick
                    && self.in_room(&notice.room_id)
                    && notice.target_user_id.as_deref() == Some(self.local_id.as_str())
                {
                    tracing::info!(room_id = %notice.room_id, "kicked from room");
                    self.leave_room();
                }
            }
            ServerEvent::CallIncoming(incoming) => {
                self.track_call(&incoming.call_id, &incoming.from_user.user_id);
            }
            ServerEvent::CallState(update) => match update.state {
                CallState::Connected => {
                    if let Some(peer_id) = self.call_peers.get(&update.call_id).cloned() {
                        let scope = LinkScope::Call(update.call_id.clone());
                        self.open_link(&peer_id, scope, &mut out).await;
                    }
                }
                CallState::Ended => self.end_call(&update.call_id),
                CallState::Ringing => {}
            },
            ServerEvent::SignalOffer(signal) => {
                let Some(scope) = signal.scope() else {
                    return Ok(out);
                };
                // The remote side may offer before our own join/accept event lands.
                let accepted = self.accepts(&signal.peer_id, scope);
                match (self.links.get_mut(&signal.peer_id), accepted) {
                    (Some(link), Some(link_scope)) => link.add_scope(link_scope),
                    (Some(_), None) => {}
                    (None, Some(link_scope)) => {
                        self.insert_link(&signal.peer_id, link_scope);
                    }
                    (None, None) => {
                        tracing::debug!(peer_id = %signal.peer_id, "dropping offer outside any room or call");
                        return Ok(out);
                    }
                }
                if let Some(link) = self.scoped_link(&signal.peer_id, scope) {
                    out.extend(link.handle_offer(&signal.sdp).await?);
                }
            }
            ServerEvent::SignalAnswer(signal) => {
                if let Some(scope) = signal.scope() {
                    if let Some(link) = self.scoped_link(&signal.peer_id, scope) {
                        out.extend(link.handle_answer(&signal.sdp).await?);
                    }
                }
            }
            ServerEvent::SignalIce(signal) => {
                if let Some(scope) = signal.scope() {
                    if let Some(link) = self.scoped_link(&signal.peer_id, scope) {
                        link.handle_candidate(&signal.candidate).await?;
                    }
                }
            }
            _ => {}
        }
        Ok(out)
    }

    pub async fn connection_state_changed(
        &mut self,
        peer_id: &str,
        state: ConnectionState,
    ) -> Result<Option<ClientEvent>, PeerError> {
        match self.links.get_mut(peer_id) {
            Some(link) => link.connection_state_changed(state).await,
            None => Ok(None),
        }
    }

    pub fn local_candidate(&self, peer_id: &str, candidate: &str) -> Option<ClientEvent> {
        self.links.get(peer_id)?.local_candidate(candidate)
    }

    /// Release every room link. Safe to call when not in a room.
    pub fn leave_room(&mut self) {
        let Some(room_id) = self.room_id.take() else {
            return;
        };
        self.release_all(&LinkScope::Room(room_id.clone()));
        tracing::debug!(room_id = %room_id, "left room, links released");
    }

    pub fn end_call(&mut self, call_id: &str) {
        self.call_peers.remove(call_id);
        self.release_all(&LinkScope::Call(call_id.to_string()));
    }

    pub fn close_all(&mut self) {
        self.room_id = None;
        self.call_peers.clear();
        for (_, mut link) in self.links.drain() {
            link.close();
        }
    }

    fn in_room(&self, room_id: &str) -> bool {
        self.room_id.as_deref() == Some(room_id)
    }

    /// Scope for a link the remote side opened, if we share that room or call.
    fn accepts(&self, peer_id: &str, scope: SignalScope<'_>) -> Option<LinkScope> {
        match scope {
            SignalScope::Room(room_id) if self.in_room(room_id) => Some(LinkScope::Room(room_id.to_string())),
            SignalScope::Call(call_id)
                if self.call_peers.get(call_id).map(String::as_str) == Some(peer_id) =>
            {
                Some(LinkScope::Call(call_id.to_string()))
            }
            _ => None,
        }
    }

    fn scoped_link(&mut self, peer_id: &str, scope: SignalScope<'_>) -> Option<&mut PeerLink> {
        match self.links.get_mut(peer_id) {
            Some(link) if link.serves(scope) => Some(link),
            Some(_) => {
                tracing::debug!(peer_id, "dropping signal for another scope");
                None
            }
            None => {
                tracing::debug!(peer_id, "dropping signal for unknown peer");
                None
            }
        }
    }

    /// Callers check for an existing link first.
    fn insert_link(&mut self, peer_id: &str, scope: LinkScope) -> &mut PeerLink {
        let transport = self.factory.connect(peer_id);
        let link = PeerLink::new(&self.local_id, peer_id, scope, transport);
        tracing::debug!(peer_id, polite = link.is_polite(), "peer link opened");
        self.links.entry(peer_id.to_string()).or_insert(link)
    }

    /// Open a link and start negotiating. One link per remote user; an
    /// existing link just gains the scope.
    async fn open_link(&mut self, peer_id: &str, scope: LinkScope, out: &mut Vec<ClientEvent>) {
        if let Some(link) = self.links.get_mut(peer_id) {
            link.add_scope(scope);
            return;
        }
        let link = self.insert_link(peer_id, scope);
        match link.negotiate().await {
            Ok(offer) => out.extend(offer),
            Err(err) => tracing::warn!(peer_id, error = %err, "initial offer failed"),
        }
    }

    /// Drop `scope` from a peer's link, closing it when nothing else holds it.
    fn release(&mut self, peer_id: &str, scope: &LinkScope) {
        let Some(link) = self.links.get_mut(peer_id) else {
            return;
        };
        if !link.holds(scope) || link.remove_scope(scope) {
            return;
        }
        if let Some(mut link) = self.links.remove(peer_id) {
            link.close();
        }
    }

    fn release_all(&mut self, scope: &LinkScope) {
        let peers: Vec<String> = self
            .links
            .iter()
            .filter(|(_, link)| link.holds(scope))
            .map(|(id, _)| id.clone())
            .collect();
        for peer_id in peers {
            self.release(&peer_id, scope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::SignalingState;
    use crate::mock::{MockFactory, TransportCall};
    use crate::transport::SdpKind;
    use huddle_models::call::CallerInfo;
    use huddle_models::gateway::{
        CallIncoming, HostActionNotice, IceSignal, ParticipantJoined, ParticipantLeft, RoomJoined,
        SdpSignal,
    };
    use huddle_models::room::{ParticipantView, RoomInfo, Visibility};

    fn manager(local: &str) -> (PeerManager<MockFactory>, MockFactory) {
        let factory = MockFactory::new(local);
        (PeerManager::new(local, factory.clone()), factory)
    }

    fn participant(user_id: &str) -> ParticipantView {
        ParticipantView {
            user_id: user_id.to_string(),
            name: user_id.to_string(),
            avatar_url: None,
            muted: false,
        }
    }

    fn room_joined(room_id: &str, members: &[&str]) -> ServerEvent {
        ServerEvent::RoomJoined(RoomJoined {
            room: RoomInfo {
                room_id: room_id.to_string(),
                name: "Standup".to_string(),
                visibility: Visibility::Public,
                locked: false,
                host_id: members[0].to_string(),
                has_password: false,
            },
            participants: members.iter().map(|id| participant(id)).collect(),
        })
    }

    fn participant_left(room_id: &str, user_id: &str) -> ServerEvent {
        ServerEvent::RoomParticipantLeft(ParticipantLeft {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
        })
    }

    /// What the relay delivers: same payload, `peer_id` rewritten to the sender.
    fn relay(from: &str, event: &ClientEvent) -> ServerEvent {
        match event.clone() {
            ClientEvent::SignalOffer(signal) => ServerEvent::SignalOffer(SdpSignal {
                peer_id: from.to_string(),
                ..signal
            }),
            ClientEvent::SignalAnswer(signal) => ServerEvent::SignalAnswer(SdpSignal {
                peer_id: from.to_string(),
                ..signal
            }),
            ClientEvent::SignalIce(signal) => ServerEvent::SignalIce(IceSignal {
                peer_id: from.to_string(),
                ..signal
            }),
            other => panic!("not a signal: {other:?}"),
        }
    }

    fn target(event: &ClientEvent) -> &str {
        match event {
            ClientEvent::SignalOffer(s) | ClientEvent::SignalAnswer(s) => &s.peer_id,
            ClientEvent::SignalIce(s) => &s.peer_id,
            other => panic!("not a signal: {other:?}"),
        }
    }

    #[tokio::test]
    async fn room_join_links_every_other_participant() -> anyhow::Result<()> {
        let (mut bob, _) = manager("bob");
        let out = bob.handle_event(&room_joined("r1", &["alice", "bob", "carol"])).await?;

        assert_eq!(bob.peers(), vec!["alice", "carol"]);
        let mut targets: Vec<&str> = out.iter().map(target).collect();
        targets.sort_unstable();
        assert_eq!(targets, vec!["alice", "carol"]);
        assert!(!bob.link("alice").expect("alice").is_polite());
        assert!(bob.link("carol").expect("carol").is_polite());
        Ok(())
    }

    #[tokio::test]
    async fn rejoin_reconciles_against_participant_list() -> anyhow::Result<()> {
        let (mut bob, factory) = manager("bob");
        bob.handle_event(&room_joined("r1", &["alice", "bob", "carol"])).await?;

        let out = bob.handle_event(&room_joined("r1", &["alice", "bob", "dave"])).await?;
        assert_eq!(bob.peers(), vec!["alice", "dave"]);
        assert_eq!(out.iter().map(target).collect::<Vec<_>>(), vec!["dave"]);
        assert_eq!(factory.transport("carol").calls().last(), Some(&TransportCall::Close));
        Ok(())
    }

    #[tokio::test]
    async fn participant_left_tears_down_once() -> anyhow::Result<()> {
        let (mut bob, factory) = manager("bob");
        bob.handle_event(&room_joined("r1", &["alice", "bob"])).await?;
        bob.handle_event(&ServerEvent::RoomParticipantJoined(ParticipantJoined {
            room_id: "r1".into(),
            user: participant("carol"),
        }))
        .await?;
        assert_eq!(bob.peers(), vec!["alice", "carol"]);

        bob.handle_event(&participant_left("r1", "carol")).await?;
        bob.handle_event(&participant_left("r1", "carol")).await?;
        assert_eq!(bob.peers(), vec!["alice"]);
        let closes = factory
            .transport("carol")
            .calls()
            .into_iter()
            .filter(|call| *call == TransportCall::Close)
            .count();
        assert_eq!(closes, 1);

        // Events for other rooms are ignored.
        bob.handle_event(&participant_left("r2", "alice")).await?;
        assert_eq!(bob.peers(), vec!["alice"]);
        Ok(())
    }

    #[tokio::test]
    async fn kick_and_leave_close_room_links() -> anyhow::Result<()> {
        let (mut bob, _) = manager("bob");
        bob.handle_event(&room_joined("r1", &["alice", "bob", "carol"])).await?;

        bob.handle_event(&ServerEvent::RoomHostAction(HostActionNotice {
            room_id: "r1".into(),
            action: HostAction::Kick,
            target_user_id: Some("bob".into()),
            muted: None,
            locked: None,
        }))
        .await?;
        assert!(bob.peers().is_empty());
        assert_eq!(bob.room_id(), None);

        bob.leave_room();
        assert!(bob.peers().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn simultaneous_offers_converge() -> anyhow::Result<()> {
        let (mut alice, alice_factory) = manager("alice");
        let (mut bob, bob_factory) = manager("bob");
        let joined = room_joined("r1", &["alice", "bob"]);

        let from_alice = alice.handle_event(&joined).await?;
        let from_bob = bob.handle_event(&joined).await?;
        assert_eq!(from_alice.len(), 1);
        assert_eq!(from_bob.len(), 1);

        // Polite alice yields to bob's offer.
        let answers = alice.handle_event(&relay("bob", &from_bob[0])).await?;
        assert!(matches!(answers.as_slice(), [ClientEvent::SignalAnswer(_)]));
        // Impolite bob ignores alice's.
        assert!(bob.handle_event(&relay("alice", &from_alice[0])).await?.is_empty());
        assert!(bob.handle_event(&relay("alice", &answers[0])).await?.is_empty());

        let alice_link = alice.link("bob").expect("link");
        let bob_link = bob.link("alice").expect("link");
        assert_eq!(alice_link.signaling_state(), SignalingState::Stable);
        assert_eq!(bob_link.signaling_state(), SignalingState::Stable);

        assert_eq!(
            alice_factory.transport("bob").calls(),
            vec![
                TransportCall::CreateOffer { ice_restart: false },
                TransportCall::Rollback,
                TransportCall::SetRemote(SdpKind::Offer, "bob-offer-1".into()),
                TransportCall::CreateAnswer,
            ]
        );
        assert_eq!(
            bob_factory.transport("alice").calls(),
            vec![
                TransportCall::CreateOffer { ice_restart: false },
                TransportCall::SetRemote(SdpKind::Answer, "alice-answer-1".into()),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn candidates_before_answer_replay_in_order() -> anyhow::Result<()> {
        let (mut alice, factory) = manager("alice");
        alice.handle_event(&room_joined("r1", &["alice", "bob"])).await?;

        let ice = |candidate: &str| {
            ServerEvent::SignalIce(IceSignal {
                peer_id: "bob".into(),
                room_id: Some("r1".into()),
                call_id: None,
                candidate: candidate.into(),
            })
        };
        alice.handle_event(&ice("c1")).await?;
        alice.handle_event(&ice("c2")).await?;
        assert_eq!(alice.link("bob").expect("link").queued_candidates(), 2);

        alice
            .handle_event(&ServerEvent::SignalAnswer(SdpSignal {
                peer_id: "bob".into(),
                room_id: Some("r1".into()),
                call_id: None,
                sdp: "bob-answer-1".into(),
            }))
            .await?;
        alice.handle_event(&ice("c3")).await?;

        assert_eq!(alice.link("bob").expect("link").queued_candidates(), 0);
        assert_eq!(
            factory.transport("bob").calls()[1..],
            [
                TransportCall::SetRemote(SdpKind::Answer, "bob-answer-1".into()),
                TransportCall::AddCandidate("c1".into()),
                TransportCall::AddCandidate("c2".into()),
                TransportCall::AddCandidate("c3".into()),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn offer_from_room_peer_creates_link() -> anyhow::Result<()> {
        let (mut alice, _) = manager("alice");
        let (mut bob, _) = manager("bob");
        let from_alice = alice.handle_event(&room_joined("r1", &["alice", "bob"])).await?;

        // Bob is in the room but has not linked alice yet.
        bob.handle_event(&room_joined("r1", &["bob"])).await?;
        let answers = bob.handle_event(&relay("alice", &from_alice[0])).await?;
        assert!(matches!(answers.as_slice(), [ClientEvent::SignalAnswer(a)] if a.peer_id == "alice"));
        assert_eq!(bob.peers(), vec!["alice"]);

        alice.handle_event(&relay("bob", &answers[0])).await?;
        assert_eq!(
            alice.link("bob").expect("link").signaling_state(),
            SignalingState::Stable
        );
        Ok(())
    }

    #[tokio::test]
    async fn call_links_follow_call_state() -> anyhow::Result<()> {
        let (mut bob, factory) = manager("bob");
        bob.handle_event(&ServerEvent::CallIncoming(CallIncoming {
            call_id: "c1".into(),
            from_user: CallerInfo {
                user_id: "alice".into(),
                name: "Alice".into(),
                avatar_url: None,
            },
        }))
        .await?;
        assert!(bob.peers().is_empty());

        let out = bob
            .handle_event(&ServerEvent::call_state("c1", CallState::Connected, None))
            .await?;
        let [ClientEvent::SignalOffer(offer)] = out.as_slice() else {
            panic!("expected one offer, got {out:?}");
        };
        assert_eq!(offer.peer_id, "alice");
        assert_eq!(offer.call_id.as_deref(), Some("c1"));
        assert_eq!(offer.room_id, None);

        let candidate = bob.local_candidate("alice", "c-local").expect("candidate");
        assert!(matches!(candidate, ClientEvent::SignalIce(ref s) if s.call_id.as_deref() == Some("c1")));

        bob.handle_event(&ServerEvent::call_state(
            "c1",
            CallState::Ended,
            Some(huddle_models::call::EndReason::Hangup),
        ))
        .await?;
        assert!(bob.peers().is_empty());
        assert_eq!(factory.transport("alice").calls().last(), Some(&TransportCall::Close));
        Ok(())
    }

    #[tokio::test]
    async fn caller_opens_link_for_tracked_call() -> anyhow::Result<()> {
        let (mut alice, _) = manager("alice");
        alice.track_call("c1", "bob");
        let out = alice
            .handle_event(&ServerEvent::call_state("c1", CallState::Connected, None))
            .await?;
        assert_eq!(out.len(), 1);
        assert_eq!(alice.peers(), vec!["bob"]);

        alice.end_call("c1");
        alice.end_call("c1");
        assert!(alice.peers().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn shared_link_survives_leaving_the_room() -> anyhow::Result<()> {
        let (mut alice, factory) = manager("alice");
        alice.handle_event(&room_joined("r1", &["alice", "bob"])).await?;
        alice.track_call("c1", "bob");
        let out = alice
            .handle_event(&ServerEvent::call_state("c1", CallState::Connected, None))
            .await?;
        assert!(out.is_empty());
        assert_eq!(factory.connected(), 1);

        alice.handle_event(&participant_left("r1", "bob")).await?;
        let link = alice.link("bob").expect("call keeps the link");
        assert_eq!(link.scope(), &LinkScope::Call("c1".into()));
        assert!(!factory.transport("bob").calls().contains(&TransportCall::Close));

        // Signals on the call still reach the link.
        alice
            .handle_event(&ServerEvent::SignalAnswer(SdpSignal {
                peer_id: "bob".into(),
                room_id: None,
                call_id: Some("c1".into()),
                sdp: "bob-answer-1".into(),
            }))
            .await?;
        assert_eq!(
            alice.link("bob").expect("link").signaling_state(),
            SignalingState::Stable
        );
        let candidate = alice.local_candidate("bob", "c-local").expect("candidate");
        assert!(matches!(candidate, ClientEvent::SignalIce(ref s) if s.call_id.as_deref() == Some("c1")));

        alice.end_call("c1");
        assert!(alice.peers().is_empty());
        assert_eq!(factory.transport("bob").calls().last(), Some(&TransportCall::Close));
        Ok(())
    }

    #[tokio::test]
    async fn ending_a_call_keeps_the_room_link() -> anyhow::Result<()> {
        let (mut bob, factory) = manager("bob");
        bob.handle_event(&room_joined("r1", &["alice", "bob"])).await?;
        bob.track_call("c1", "alice");
        bob.handle_event(&ServerEvent::call_state("c1", CallState::Connected, None))
            .await?;

        bob.handle_event(&ServerEvent::call_state(
            "c1",
            CallState::Ended,
            Some(huddle_models::call::EndReason::Hangup),
        ))
        .await?;
        assert_eq!(bob.peers(), vec!["alice"]);
        assert_eq!(
            bob.link("alice").expect("link").scope(),
            &LinkScope::Room("r1".into())
        );
        assert!(!factory.transport("alice").calls().contains(&TransportCall::Close));
        Ok(())
    }

    #[tokio::test]
    async fn unscoped_offers_are_dropped() -> anyhow::Result<()> {
        let (mut bob, factory) = manager("bob");
        let offer = |room_id: Option<&str>, call_id: Option<&str>| {
            ServerEvent::SignalOffer(SdpSignal {
                peer_id: "mallory".into(),
                room_id: room_id.map(str::to_string),
                call_id: call_id.map(str::to_string),
                sdp: "v=0".into(),
            })
        };
        assert!(bob.handle_event(&offer(Some("r9"), None)).await?.is_empty());
        assert!(bob.handle_event(&offer(None, Some("c9"))).await?.is_empty());
        assert!(bob.handle_event(&offer(None, None)).await?.is_empty());
        assert_eq!(factory.connected(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn ice_restart_through_manager() -> anyhow::Result<()> {
        let (mut alice, _) = manager("alice");
        alice.handle_event(&room_joined("r1", &["alice", "bob"])).await?;
        assert!(alice
            .connection_state_changed("nobody", ConnectionState::Failed)
            .await?
            .is_none());

        // First offer is still pending, so the restart waits for the answer.
        assert!(alice
            .connection_state_changed("bob", ConnectionState::Failed)
            .await?
            .is_none());
        let out = alice
            .handle_event(&ServerEvent::SignalAnswer(SdpSignal {
                peer_id: "bob".into(),
                room_id: Some("r1".into()),
                call_id: None,
                sdp: "bob-answer-1".into(),
            }))
            .await?;
        assert!(matches!(out.as_slice(), [ClientEvent::SignalOffer(_)]));
        assert_eq!(alice.peers(), vec!["bob"]);
        Ok(())
    }
}
