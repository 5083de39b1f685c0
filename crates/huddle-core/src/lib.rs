pub mod auth;
pub mod call;
pub mod chat;
pub mod error;
pub mod events;
pub mod rate_limit;
pub mod registry;
pub mod room;
pub mod session;
pub mod signaling;
pub mod social;
pub mod store;

use huddle_models::gateway::{PresenceList, RoomList, ServerEvent};
use huddle_models::room::DEFAULT_MAX_PARTICIPANTS;
use std::sync::Arc;

use auth::IdentityVerifier;
use events::{ConnId, EventBus};
use rate_limit::RateLimitConfig;
use registry::Registry;
use store::Store;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub max_participants: usize,
    pub rate_limits: RateLimitConfig,
    /// Create user records from verified token claims on first `hello`
    /// instead of rejecting unknown users.
    pub provision_users: bool,
    /// Snowflake worker id for message, thread and notification ids.
    pub worker_id: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            rate_limits: RateLimitConfig::default(),
            provision_users: false,
            worker_id: 1,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub events: EventBus,
    pub store: Arc<dyn Store>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn Store>, verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self {
            registry: Arc::new(Registry::new(config.max_participants)),
            events: EventBus::new(),
            store,
            verifier,
            config,
        }
    }

    pub fn send(&self, conn: ConnId, event: ServerEvent) {
        if !self.events.send(conn, event) {
            tracing::debug!(conn_id = conn, "dropping event for closed connection");
        }
    }

    /// Deliver to the user's current connection. Returns false if offline.
    pub fn send_to_user(&self, user_id: &str, event: ServerEvent) -> bool {
        match self.registry.route_of(user_id) {
            Some(conn) => self.events.send(conn, event),
            None => false,
        }
    }

    /// Online list to every identified connection except `except`.
    pub fn broadcast_presence(&self, except: Option<ConnId>) {
        let event = ServerEvent::PresenceList(PresenceList {
            users_online: self.registry.list_online(),
        });
        let targets = self
            .registry
            .authenticated_conns()
            .into_iter()
            .filter(|conn| Some(*conn) != except);
        self.events.send_many(targets, &event);
    }

    pub fn broadcast_room_list(&self) {
        let event = ServerEvent::RoomList(RoomList {
            rooms: self.registry.list_public_rooms(),
        });
        self.events.send_many(self.registry.authenticated_conns(), &event);
    }

    pub fn next_id(&self) -> i64 {
        huddle_util::snowflake::generate(self.config.worker_id)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::auth::{create_token, JwtVerifier};
    use crate::events::EventReceiver;
    use crate::session::Session;
    use crate::store::MemoryStore;
    use huddle_models::gateway::{ClientEvent, Hello};

    pub const SECRET: &str = "unit-test-secret";

    pub fn state_with(config: AppConfig) -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(config, store.clone(), Arc::new(JwtVerifier::new(SECRET)));
        (state, store)
    }

    pub fn state() -> (AppState, Arc<MemoryStore>) {
        state_with(AppConfig::default())
    }

    /// A connected client driven directly through its session.
    pub struct Client {
        pub session: Session,
        pub rx: EventReceiver,
        pub user_id: String,
    }

    impl Client {
        pub async fn send(&mut self, state: &AppState, event: ClientEvent) {
            self.session.handle(state, event).await;
        }

        pub fn drain(&mut self) -> Vec<ServerEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.rx.try_recv() {
                out.push(event);
            }
            out
        }

        pub fn conn(&self) -> ConnId {
            self.session.conn_id()
        }
    }

    /// Seed the user, connect and identify.
    pub async fn login(state: &AppState, store: &MemoryStore, user_id: &str) -> Client {
        store.insert_user(user_id, &user_id.to_uppercase());
        let (session, rx) = Session::open(state);
        let mut client = Client {
            session,
            rx,
            user_id: user_id.to_string(),
        };
        let token = create_token(user_id, user_id, SECRET, 3600).unwrap();
        client.send(state, ClientEvent::Hello(Hello { token })).await;
        client.drain();
        client
    }
}
