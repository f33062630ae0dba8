use std::net::Ipv4Addr;

use tracing::info;

use taskboard::{
    config::Config, create_app, db, spawn_session_sweeper, AppState, SESSION_SWEEP_INTERVAL,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::from_env().expect("valid TASKBOARD_* configuration");
    let db = db::init_db(&config.db_path).expect("initializing database");

    let addr = (Ipv4Addr::UNSPECIFIED, config.port);
    let state = AppState::new(db, config);
    spawn_session_sweeper(&state, SESSION_SWEEP_INTERVAL);
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("binding listener");

    info!("running on {addr:?}");

    axum::serve(listener, app).await.expect("failed serving");
}
