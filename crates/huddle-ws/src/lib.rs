mod handler;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use huddle_core::AppState;

pub fn gateway_router() -> Router<AppState> {
    Router::new()
        .route("/gateway", get(ws_upgrade))
        .route("/health", get(health))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_connection(socket, state))
}

async fn health() -> &'static str {
    "ok"
}
