use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use huddle_core::auth::{create_token, JwtVerifier};
use huddle_core::store::{MemoryStore, SqlStore, Store};
use huddle_core::AppState;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("huddle=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    ensure_data_dirs(&config);
    let store = open_store(&config).await?;

    if let Some(cli::Command::MintToken { user_id, name }) = args.command {
        let name = name.unwrap_or_else(|| user_id.clone());
        let user = store.upsert_user(&user_id, &name).await?;
        let token = create_token(
            &user.id,
            &user.display_name,
            &config.auth.jwt_secret,
            config.auth.jwt_expiry_seconds,
        )?;
        if config.database.is_memory() {
            tracing::warn!("minting against the in-memory store; the user will not outlive this process");
        }
        println!("{token}");
        return Ok(());
    }

    let verifier = Arc::new(JwtVerifier::new(&config.auth.jwt_secret));
    let state = AppState::new(config.app_config(), store, verifier);

    let app = huddle_ws::gateway_router()
        .with_state(state)
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    print_startup_banner(&config);

    let shutdown_signal = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!();
            tracing::info!("Shutting down (ctrl-c)...");
        }
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

async fn open_store(config: &config::Config) -> Result<Arc<dyn Store>> {
    if config.database.is_memory() {
        tracing::info!("using in-memory store; nothing is persisted");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let pool = huddle_db::create_pool(&config.database.url, config.database.max_connections).await?;
    huddle_db::run_migrations(&pool).await?;
    Ok(Arc::new(SqlStore::new(pool)))
}

/// Create the parent directory of a file-backed SQLite database.
fn ensure_data_dirs(config: &config::Config) {
    let url = &config.database.url;
    let Some(rest) = url.strip_prefix("sqlite://") else {
        return;
    };
    let db_path = rest.split('?').next().unwrap_or(rest);
    if db_path.is_empty() || db_path.contains(":memory:") {
        return;
    }
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                tracing::warn!("could not create database directory {:?}: {}", parent, err);
            }
        }
    }
}

fn build_cors_layer() -> tower_http::cors::CorsLayer {
    tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

fn print_startup_banner(config: &config::Config) {
    println!();
    println!("  huddle-server {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("  Listening:   ws://{}/gateway", config.server.bind_address);
    println!("  Database:    {}", config.database.url);
    println!("  Room size:   {} participants", config.rooms.max_participants);
    println!(
        "  New users:   {}",
        if config.auth.provision_users { "provisioned from tokens" } else { "must exist" }
    );
    println!();
}
