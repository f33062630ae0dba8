pub mod auth;
pub mod board_controller;
pub mod board_state;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod session;
pub mod store;
pub mod task_service;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post, put},
    Router,
};
use config::Config;
use db::DbPool;
use session::SessionRegistry;
use store::{EntityStore, SqliteStore};
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub store: Arc<dyn EntityStore>,
    pub sessions: Arc<SessionRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let store = SqliteStore::new(db.clone()).into_shared();
        let sessions = Arc::new(SessionRegistry::new(store.clone(), config.init_timeout));
        Self {
            db,
            store,
            sessions,
            config: Arc::new(config),
        }
    }
}

pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically deletes expired session rows and evicts their contexts, so
/// abandoned logins do not keep their board subscriptions alive.
pub fn spawn_session_sweeper(state: &AppState, every: Duration) -> JoinHandle<()> {
    let pool = state.db.clone();
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(err) = db::cleanup_expired_sessions(&pool) {
                warn!(error = %err, "Could not clean up expired sessions");
            }
            sessions.evict_expired(models::now_millis()).await;
        }
    })
}

pub fn create_app(state: AppState) -> Router {
    let base_path = state.config.base_path.clone();

    let app_routes = Router::new()
        .route("/api/register", post(handlers::auth::register))
        .route("/api/login", post(handlers::auth::login))
        .route("/api/logout", post(handlers::auth::logout))
        .route(
            "/api/profile",
            get(handlers::auth::get_profile).put(handlers::auth::update_profile),
        )
        .route(
            "/api/profile/notifications/{channel}",
            post(handlers::auth::toggle_notification),
        )
        .route("/api/board", get(handlers::api::get_board))
        .route("/api/lists", post(handlers::api::create_list))
        .route(
            "/api/lists/{id}",
            put(handlers::api::rename_list).delete(handlers::api::delete_list),
        )
        .route("/api/lists/{id}/tasks", post(handlers::api::create_task))
        .route(
            "/api/tasks/{id}",
            put(handlers::api::update_task).delete(handlers::api::delete_task),
        )
        .route("/api/tasks/{id}/move", post(handlers::api::move_task))
        .route("/api/tasks/{id}/complete", post(handlers::api::complete_task))
        .route(
            "/api/notifications",
            get(handlers::api::list_notifications),
        )
        .route(
            "/api/notifications/check",
            post(handlers::api::check_deadlines),
        )
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::compression::CompressionLayer::new()),
        )
        .with_state(state);

    tracing::info!("base_path: {base_path:?}");

    if base_path.is_empty() {
        app_routes
    } else {
        Router::new().nest(&base_path, app_routes)
    }
}
