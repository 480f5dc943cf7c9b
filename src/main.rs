use radar_relay::{config, hub, routes, state};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8000".into())
        .parse()
        .expect("invalid PORT");

    let radar_config = config::RadarConfig::from_env();
    let state = state::AppState::new(radar_config);

    // Sweep stale presences on an independent timer.
    let _reaper = hub::spawn_reaper(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "radar relay listening");
    axum::serve(listener, app).await.expect("server failed");
}
