//! Direct call negotiation: `ringing -> connected -> ended`.

use huddle_models::call::{CallState, EndReason};
use huddle_models::gateway::{CallIncoming, CallInvite, CallRef, ServerEvent};
use tracing::{debug, info};

use crate::error::CoreError;
use crate::registry::CallEntry;
use crate::session::Actor;
use crate::AppState;

pub fn invite(state: &AppState, actor: &Actor, req: CallInvite) -> Result<(), CoreError> {
    if req.to_user_id == actor.user_id {
        return Err(CoreError::BadRequest("cannot call yourself"));
    }
    let caller = state
        .registry
        .user_of(actor.conn)
        .ok_or(CoreError::Forbidden)?;
    let callee_conn = state
        .registry
        .route_of(&req.to_user_id)
        .ok_or(CoreError::UserOffline)?;

    let call_id = uuid::Uuid::new_v4().to_string();
    if !state.registry.open_call(&call_id, &actor.user_id, &req.to_user_id) {
        debug!(call_id = %call_id, user_id = %actor.user_id, callee = %req.to_user_id, "callee busy");
        state.send(
            actor.conn,
            ServerEvent::call_state(&call_id, CallState::Ended, Some(EndReason::Busy)),
        );
        return Ok(());
    }

    info!(call_id = %call_id, caller = %actor.user_id, callee = %req.to_user_id, "call ringing");
    state.send(
        callee_conn,
        ServerEvent::CallIncoming(CallIncoming {
            call_id: call_id.clone(),
            from_user: caller.caller_info(),
        }),
    );
    state.send(
        actor.conn,
        ServerEvent::call_state(&call_id, CallState::Ringing, None),
    );
    Ok(())
}

pub fn accept(state: &AppState, actor: &Actor, req: CallRef) -> Result<(), CoreError> {
    let call = state.registry.call(&req.call_id).ok_or(CoreError::NotFound)?;
    if call.callee_id != actor.user_id {
        return Err(CoreError::Forbidden);
    }
    let call = state
        .registry
        .transition_call(&req.call_id, CallState::Ringing, CallState::Connected)
        .ok_or(CoreError::BadRequest("call is not ringing"))?;
    info!(call_id = %call.call_id, "call connected");
    notify(state, &call, CallState::Connected, None);
    Ok(())
}

pub fn decline(state: &AppState, actor: &Actor, req: CallRef) -> Result<(), CoreError> {
    let call = state.registry.call(&req.call_id).ok_or(CoreError::NotFound)?;
    if !call.involves(&actor.user_id) {
        return Err(CoreError::Forbidden);
    }
    let call = state
        .registry
        .transition_call(&req.call_id, CallState::Ringing, CallState::Ended)
        .ok_or(CoreError::BadRequest("call is not ringing"))?;
    state.registry.remove_call(&call.call_id);
    info!(call_id = %call.call_id, user_id = %actor.user_id, "call declined");
    notify(state, &call, CallState::Ended, Some(EndReason::Declined));
    Ok(())
}

pub fn end(state: &AppState, actor: &Actor, req: CallRef) -> Result<(), CoreError> {
    let call = state.registry.call(&req.call_id).ok_or(CoreError::NotFound)?;
    if !call.involves(&actor.user_id) {
        return Err(CoreError::Forbidden);
    }
    if let Some(call) = state.registry.remove_call(&req.call_id) {
        info!(call_id = %call.call_id, user_id = %actor.user_id, "call ended");
        notify(state, &call, CallState::Ended, Some(EndReason::Hangup));
    }
    Ok(())
}

/// End every call the user is part of.
pub fn end_all(state: &AppState, user_id: &str, reason: EndReason) {
    for call in state.registry.calls_of(user_id) {
        if let Some(call) = state.registry.remove_call(&call.call_id) {
            debug!(call_id = %call.call_id, user_id, ?reason, "call torn down");
            notify(state, &call, CallState::Ended, Some(reason));
        }
    }
}

/// Both parties' routes are resolved now, not when the call started.
fn notify(state: &AppState, call: &CallEntry, to: CallState, reason: Option<EndReason>) {
    let conns = state
        .registry
        .routes_of([call.caller_id.as_str(), call.callee_id.as_str()]);
    state
        .events
        .send_many(conns, &ServerEvent::call_state(&call.call_id, to, reason));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{login, state, Client};
    use huddle_models::error::ErrorCode;
    use huddle_models::gateway::ClientEvent;

    fn incoming_call_id(client: &mut Client) -> String {
        client
            .drain()
            .into_iter()
            .find_map(|e| match e {
                ServerEvent::CallIncoming(incoming) => Some(incoming.call_id),
                _ => None,
            })
            .expect("call.incoming")
    }

    fn states(client: &mut Client) -> Vec<(CallState, Option<EndReason>)> {
        client
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::CallState(update) => Some((update.state, update.reason)),
                _ => None,
            })
            .collect()
    }

    fn invite_event(to: &str) -> ClientEvent {
        ClientEvent::CallInvite(CallInvite {
            to_user_id: to.to_string(),
        })
    }

    #[tokio::test]
    async fn ring_accept_hangup() {
        let (state, store) = state();
        let mut alice = login(&state, &store, "alice").await;
        let mut bob = login(&state, &store, "bob").await;
        alice.drain();

        alice.send(&state, invite_event("bob")).await;
        assert_eq!(states(&mut alice), vec![(CallState::Ringing, None)]);
        let call_id = incoming_call_id(&mut bob);

        // Only the callee may accept.
        alice
            .send(&state, ClientEvent::CallAccept(CallRef { call_id: call_id.clone() }))
            .await;
        assert!(alice.drain().is_empty());

        bob.send(&state, ClientEvent::CallAccept(CallRef { call_id: call_id.clone() }))
            .await;
        assert_eq!(states(&mut alice), vec![(CallState::Connected, None)]);
        assert_eq!(states(&mut bob), vec![(CallState::Connected, None)]);

        alice
            .send(&state, ClientEvent::CallEnd(CallRef { call_id: call_id.clone() }))
            .await;
        assert_eq!(
            states(&mut bob),
            vec![(CallState::Ended, Some(EndReason::Hangup))]
        );
        assert!(state.registry.call(&call_id).is_none());
    }

    #[tokio::test]
    async fn busy_callee_gets_no_second_record() {
        let (state, store) = state();
        let mut alice = login(&state, &store, "alice").await;
        let mut bob = login(&state, &store, "bob").await;
        let mut carol = login(&state, &store, "carol").await;
        alice.drain();
        bob.drain();

        alice.send(&state, invite_event("bob")).await;
        incoming_call_id(&mut bob);

        carol.send(&state, invite_event("bob")).await;
        assert_eq!(
            states(&mut carol),
            vec![(CallState::Ended, Some(EndReason::Busy))]
        );
        assert!(bob.drain().is_empty());
        assert_eq!(state.registry.calls_of("bob").len(), 1);
        assert!(state.registry.calls_of("carol").is_empty());
    }

    #[tokio::test]
    async fn decline_ends_and_removes() {
        let (state, store) = state();
        let mut alice = login(&state, &store, "alice").await;
        let mut bob = login(&state, &store, "bob").await;
        alice.drain();

        alice.send(&state, invite_event("bob")).await;
        alice.drain();
        let call_id = incoming_call_id(&mut bob);
        bob.send(&state, ClientEvent::CallDecline(CallRef { call_id: call_id.clone() }))
            .await;
        assert_eq!(
            states(&mut alice),
            vec![(CallState::Ended, Some(EndReason::Declined))]
        );
        assert!(!state.registry.has_active_call("alice"));
    }

    #[tokio::test]
    async fn offline_callee_and_self_invite() {
        let (state, store) = state();
        let mut alice = login(&state, &store, "alice").await;

        alice.send(&state, invite_event("ghost")).await;
        let events = alice.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::Error(p) if p.code == ErrorCode::UserOffline
        )));

        alice.send(&state, invite_event("alice")).await;
        assert!(alice.drain().is_empty());
    }

    #[tokio::test]
    async fn disconnect_ends_the_call() {
        let (state, store) = state();
        let mut alice = login(&state, &store, "alice").await;
        let mut bob = login(&state, &store, "bob").await;
        alice.drain();

        alice.send(&state, invite_event("bob")).await;
        alice.drain();
        incoming_call_id(&mut bob);

        bob.session.close(&state).await;
        assert_eq!(
            states(&mut alice),
            vec![(CallState::Ended, Some(EndReason::Disconnected))]
        );
        assert!(!state.registry.has_active_call("alice"));
    }
}
