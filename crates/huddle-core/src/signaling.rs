//! Opaque WebRTC signal relay. Payloads are forwarded untouched; only the
//! envelope is checked.

use huddle_models::gateway::{IceSignal, SdpSignal, ServerEvent, SignalScope};
use tracing::debug;

use crate::error::CoreError;
use crate::session::Actor;
use crate::AppState;

pub fn relay_offer(state: &AppState, actor: &Actor, signal: SdpSignal) -> Result<(), CoreError> {
    relay_sdp(state, actor, signal, ServerEvent::SignalOffer)
}

pub fn relay_answer(state: &AppState, actor: &Actor, signal: SdpSignal) -> Result<(), CoreError> {
    relay_sdp(state, actor, signal, ServerEvent::SignalAnswer)
}

pub fn relay_ice(state: &AppState, actor: &Actor, mut signal: IceSignal) -> Result<(), CoreError> {
    if signal.candidate.is_empty() {
        return Err(CoreError::BadRequest("empty candidate"));
    }
    let scope = signal.scope().ok_or(CoreError::BadRequest("signal needs one scope"))?;
    let target = authorize(state, actor, &signal.peer_id, scope)?;
    signal.peer_id = actor.user_id.clone();
    state.send(target, ServerEvent::SignalIce(signal));
    Ok(())
}

fn relay_sdp(
    state: &AppState,
    actor: &Actor,
    mut signal: SdpSignal,
    wrap: fn(SdpSignal) -> ServerEvent,
) -> Result<(), CoreError> {
    if signal.sdp.is_empty() {
        return Err(CoreError::BadRequest("empty sdp"));
    }
    let scope = signal.scope().ok_or(CoreError::BadRequest("signal needs one scope"))?;
    let target = authorize(state, actor, &signal.peer_id, scope)?;
    signal.peer_id = actor.user_id.clone();
    state.send(target, wrap(signal));
    Ok(())
}

/// Both endpoints must share the room, or be the two parties of a live call.
/// Returns the target's current connection.
fn authorize(
    state: &AppState,
    actor: &Actor,
    peer_id: &str,
    scope: SignalScope<'_>,
) -> Result<crate::events::ConnId, CoreError> {
    if peer_id.is_empty() {
        return Err(CoreError::BadRequest("missing peer id"));
    }
    if peer_id == actor.user_id {
        return Err(CoreError::BadRequest("cannot signal yourself"));
    }

    let allowed = match scope {
        SignalScope::Room(room_id) => {
            state.registry.is_participant(room_id, &actor.user_id)
                && state.registry.is_participant(room_id, peer_id)
        }
        SignalScope::Call(call_id) => state.registry.call(call_id).is_some_and(|call| {
            call.state.is_active() && call.involves(&actor.user_id) && call.other_party(&actor.user_id) == peer_id
        }),
    };
    if !allowed {
        debug!(user_id = %actor.user_id, peer_id, ?scope, "signal outside shared scope");
        return Err(CoreError::Forbidden);
    }

    state.registry.route_of(peer_id).ok_or(CoreError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{login, state, Client};
    use huddle_models::gateway::{CallInvite, ClientEvent, RoomCreate, RoomJoin};
    use huddle_models::room::Visibility;

    async fn shared_room(state: &AppState, clients: &mut [&mut Client]) -> String {
        clients[0]
            .send(
                state,
                ClientEvent::RoomCreate(RoomCreate {
                    name: "sig".into(),
                    visibility: Visibility::Public,
                    password: None,
                }),
            )
            .await;
        let room_id = clients[0]
            .drain()
            .into_iter()
            .find_map(|e| match e {
                ServerEvent::RoomCreated(c) => Some(c.room.room_id),
                _ => None,
            })
            .expect("room.created");
        for client in clients.iter_mut() {
            client
                .send(
                    state,
                    ClientEvent::RoomJoin(RoomJoin {
                        room_id: room_id.clone(),
                        password: None,
                    }),
                )
                .await;
        }
        for client in clients.iter_mut() {
            client.drain();
        }
        room_id
    }

    #[tokio::test]
    async fn offer_is_forwarded_with_sender_as_peer() {
        let (state, store) = state();
        let mut a = login(&state, &store, "a").await;
        let mut b = login(&state, &store, "b").await;
        let room_id = shared_room(&state, &mut [&mut a, &mut b]).await;

        a.send(
            &state,
            ClientEvent::SignalOffer(SdpSignal {
                peer_id: "b".into(),
                room_id: Some(room_id.clone()),
                call_id: None,
                sdp: "v=0 offer".into(),
            }),
        )
        .await;

        let events = b.drain();
        assert_eq!(
            events,
            vec![ServerEvent::SignalOffer(SdpSignal {
                peer_id: "a".into(),
                room_id: Some(room_id),
                call_id: None,
                sdp: "v=0 offer".into(),
            })]
        );
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn signals_outside_a_shared_scope_are_dropped() {
        let (state, store) = state();
        let mut a = login(&state, &store, "a").await;
        let mut b = login(&state, &store, "b").await;
        let mut c = login(&state, &store, "c").await;
        let room_id = shared_room(&state, &mut [&mut a, &mut b]).await;
        c.drain();

        // c is not in the room.
        c.send(
            &state,
            ClientEvent::SignalIce(IceSignal {
                peer_id: "a".into(),
                room_id: Some(room_id.clone()),
                call_id: None,
                candidate: "candidate:1".into(),
            }),
        )
        .await;
        // Both scopes at once.
        a.send(
            &state,
            ClientEvent::SignalIce(IceSignal {
                peer_id: "b".into(),
                room_id: Some(room_id),
                call_id: Some("call".into()),
                candidate: "candidate:1".into(),
            }),
        )
        .await;

        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());
        assert!(c.drain().is_empty());
    }

    #[tokio::test]
    async fn call_scope_reaches_the_other_party() {
        let (state, store) = state();
        let mut a = login(&state, &store, "a").await;
        let mut b = login(&state, &store, "b").await;
        a.drain();

        a.send(
            &state,
            ClientEvent::CallInvite(CallInvite {
                to_user_id: "b".into(),
            }),
        )
        .await;
        a.drain();
        let call_id = b
            .drain()
            .into_iter()
            .find_map(|e| match e {
                ServerEvent::CallIncoming(i) => Some(i.call_id),
                _ => None,
            })
            .unwrap();

        b.send(
            &state,
            ClientEvent::SignalAnswer(SdpSignal {
                peer_id: "a".into(),
                room_id: None,
                call_id: Some(call_id.clone()),
                sdp: "v=0 answer".into(),
            }),
        )
        .await;
        assert!(a.drain().iter().any(|e| matches!(
            e,
            ServerEvent::SignalAnswer(s) if s.peer_id == "b" && s.call_id.as_deref() == Some(call_id.as_str())
        )));
    }
}
