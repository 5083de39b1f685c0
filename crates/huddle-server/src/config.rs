use anyhow::Result;
use huddle_core::rate_limit::RateLimitConfig;
use huddle_core::AppConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// `database.url` value that selects the in-memory store.
pub const MEMORY_DATABASE: &str = "memory";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rooms: RoomsConfig,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Snowflake worker id; distinct per process sharing a database.
    #[serde(default = "default_worker_id")]
    pub worker_id: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8090".into(),
            worker_id: default_worker_id(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/huddle.db?mode=rwc".into(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url.trim().eq_ignore_ascii_case(MEMORY_DATABASE)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_seconds: u64,
    /// Accept any validly signed token, creating its user on first hello.
    #[serde(default)]
    pub provision_users: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: generate_random_hex(64),
            jwt_expiry_seconds: default_jwt_expiry(),
            provision_users: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RoomsConfig {
    #[serde(default = "default_max_participants")]
    pub max_participants: usize,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            max_participants: default_max_participants(),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn generate_random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..16u8);
            char::from(if idx < 10 { b'0' + idx } else { b'a' + idx - 10 })
        })
        .collect()
}

fn default_worker_id() -> u16 {
    1
}
fn default_max_connections() -> u32 {
    10
}
fn default_jwt_expiry() -> u64 {
    86_400
}
fn default_max_participants() -> usize {
    AppConfig::default().max_participants
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str::<Config>(&content)?
        } else {
            tracing::info!("Config file not found at '{}', generating defaults...", path);
            let config = Config::default();
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(path, toml::to_string_pretty(&config)?)?;
            tracing::info!("Generated default config at '{}'", path);
            config
        };

        if let Ok(value) = std::env::var("HUDDLE_BIND_ADDRESS") {
            config.server.bind_address = value;
        }
        if let Ok(value) = std::env::var("HUDDLE_DATABASE_URL") {
            config.database.url = value;
        }
        if let Ok(value) = std::env::var("HUDDLE_JWT_SECRET") {
            config.auth.jwt_secret = value;
        }

        if config.auth.jwt_secret.trim().is_empty() {
            anyhow::bail!("auth.jwt_secret is empty; set it in '{}' or via HUDDLE_JWT_SECRET", path);
        }
        if config.rooms.max_participants == 0 {
            anyhow::bail!("rooms.max_participants must be at least 1");
        }
        Ok(config)
    }

    pub fn app_config(&self) -> AppConfig {
        AppConfig {
            max_participants: self.rooms.max_participants,
            rate_limits: self.rate_limits,
            provision_users: self.auth.provision_users,
            worker_id: self.server.worker_id,
        }
    }
}
