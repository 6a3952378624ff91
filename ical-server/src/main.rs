use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::EnvFilter;

use ical_server::mbta::{MbtaClient, MbtaConfig};
use ical_server::web::{AppState, create_router};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = MbtaConfig::new();
    if let Ok(base_url) = std::env::var("MBTA_API_URL") {
        config = config.with_base_url(base_url);
    }
    match std::env::var("MBTA_API_KEY") {
        Ok(key) => config = config.with_api_key(key),
        Err(_) => info!("MBTA_API_KEY not set; running with anonymous rate limits"),
    }

    let client = MbtaClient::new(config).expect("failed to create MBTA client");

    let default_home_stop = std::env::var("DEFAULT_HOME_STOP").ok();
    let default_work_stop = std::env::var("DEFAULT_WORK_STOP").ok();
    let state = AppState::new(client, default_home_stop, default_work_stop)
        .expect("failed to create application state");

    let app = create_router(state);

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

    info!(%addr, "MBTA commuter rail calendar server listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listen address");
    axum::serve(listener, app)
        .await
        .expect("server terminated unexpectedly");
}
