use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use huddle_core::session::Session;
use huddle_core::AppState;
use huddle_models::gateway::{ClientEvent, ServerEvent};
use tokio::time::Duration;

const PING_INTERVAL: Duration = Duration::from_secs(20);

pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (mut session, mut event_rx) = Session::open(&state);
    let conn_id = session.conn_id();
    tracing::debug!(conn_id, "gateway connection opened");

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ping_interval.tick().await;

    let reason = loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => session.handle(&state, event).await,
                            Err(err) => {
                                tracing::debug!(conn_id, error = %err, "dropping malformed frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => format!("client close frame (code={}, reason={})", frame.code, frame.reason),
                            None => "client close frame".to_string(),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break format!("websocket receive error: {err}"),
                    None => break "stream ended".to_string(),
                }
            }
            event = event_rx.recv() => {
                let Some(event) = event else {
                    break "event channel closed".to_string();
                };
                if let Err(reason) = send_event(&mut sender, &event).await {
                    break reason;
                }
            }
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break "websocket ping send error".to_string();
                }
            }
        }
    };

    let user_id = session.user_id().map(str::to_string);
    session.close(&state).await;
    match user_id {
        Some(user_id) => tracing::info!(conn_id, user_id = %user_id, "client disconnected: {reason}"),
        None => tracing::debug!(conn_id, "anonymous connection closed: {reason}"),
    }
}

async fn send_event(
    sender: &mut (impl SinkExt<Message> + Unpin),
    event: &ServerEvent,
) -> Result<(), String> {
    let payload = serde_json::to_string(event).map_err(|e| format!("failed to encode event: {e}"))?;
    sender
        .send(Message::Text(payload.into()))
        .await
        .map_err(|_| "websocket send error".to_string())
}

