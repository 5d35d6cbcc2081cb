use carecrew::{app, config::Config, db, AppState};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");

    let conn = db::establish_connection(&config.database_path)
        .expect("Failed to establish database connection");
    tracing::info!(path = %config.database_path, "database ready");

    let state = AppState::new(conn, &config).expect("Invalid SIGNING_SECRET");
    let app = app(state);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .expect("Invalid SERVER_HOST or SERVER_PORT");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app).await.expect("Failed to start server");
}
