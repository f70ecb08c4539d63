//! pchat server library
//!
//! Append-only conversation logs, a conversation directory with per-user
//! checkpoints, and the polling endpoint clients synchronize against.

pub mod clock;
pub mod config;
pub mod ctx;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod store;
pub mod sync;
pub mod users;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use config::{AppState, ServerConfig};
use handlers::{chat, presence};
use sync::SyncEndpoint;
use users::UserStore;

pub use error::{Error, Result};

/// All routes, with identity middleware on everything but `/health`.
pub fn app(state: AppState) -> Router {
    let authed = Router::new()
        .route("/chat/summary", get(chat::summary))
        .route("/chat/im/new", post(chat::start_im))
        .route("/chat/room/join", post(chat::join_room))
        .route("/chat/tryroom/{name}", get(chat::try_room))
        .route("/chat/roomlist", get(chat::room_list))
        .route("/chat/recent/{id}", get(chat::recent))
        .route("/chat/since/{id}/{timestamp}", get(chat::since))
        .route("/chat/add", post(chat::add))
        .route("/chat/leave", post(chat::leave))
        .route("/chat/checkpoint", post(chat::checkpoint))
        .route("/chat/timestamp/{id}", get(chat::timestamp))
        .route("/chat/info/{id}", get(chat::info))
        .route("/user/lastseen/{id}", get(presence::last_seen))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            ctx::mw_require_user,
        ));

    Router::new()
        .merge(authed)
        .route("/health", get(health_check))
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pchat_server=info,tower_http=info".into());

    // Already set when embedded in a test harness; ignore
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    let config = ServerConfig::from_env();
    config.ensure_dirs().await?;

    info!("=== pchat server ===");
    info!("Storage directory: {:?}", config.data_dir);

    let users = Arc::new(UserStore::load(config.users_path()).await?);
    let sync = Arc::new(SyncEndpoint::open(&config, users.clone()).await?);
    info!(
        "Sync endpoint ready (recent limit {}, expiry 1/{})",
        config.recent_limit, config.expiry_chance
    );

    let app = app(AppState { sync, users });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK - pchat server"
}
