mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use wall_api::{AppState, AppStateInner};
use wall_db::Database;
use wall_gateway::FanoutBroker;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wall=debug,wall_api=debug,wall_gateway=debug,wall_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Database::open(&config.db_path)?;
    let broker = FanoutBroker::new(config.broker.clone());

    let state: AppState = Arc::new(AppStateInner {
        db,
        broker: broker.clone(),
        jwt_secret: config.jwt_secret.clone(),
        settings: config.settings.clone(),
    });

    let app = wall_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Wall server listening on {}", addr);
    info!(
        "Queue capacity {} frames, heartbeat every {}s",
        config.broker.queue_capacity,
        config.settings.heartbeat.as_secs()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(broker))
        .await?;

    Ok(())
}

/// Wait for Ctrl+C / SIGTERM, then close every live stream so graceful
/// shutdown is not held open by long-lived responses.
async fn shutdown_signal(broker: FanoutBroker) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }

    broker.shutdown();
}
