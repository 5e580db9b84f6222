use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipstream_gateway::config::Config;
use clipstream_gateway::hub::Hub;
use clipstream_gateway::{routes, AppState};
use clipstream_rpc::ClientPool;

/// Backend services the gateway dispatches to.
const SERVICES: &[&str] = &[
    "user",
    "video",
    "social",
    "interaction",
    "message",
    "live",
    "danmu",
    "recommend",
];

#[tokio::main]
async fn main() {
    // Env vars may be set externally; a missing .env is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env());

    // Fatal by design: without the registry no backend is resolvable. A
    // service with an empty endpoint set is fine and surfaces as 503 per call.
    let clients = ClientPool::connect(config.registry_endpoints.clone(), SERVICES)
        .await
        .expect("service registry unreachable");

    let hub = Hub::spawn(config.send_queue_capacity);

    let state = AppState {
        config: config.clone(),
        clients,
        hub: hub.clone(),
    };
    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "gateway listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");

    let drain_hub = hub.clone();
    let shutdown_timeout = config.shutdown_timeout;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received, draining the hub");
        drain_hub.shutdown(shutdown_timeout).await;
    })
    .await
    .expect("server error");

    tracing::info!("gateway exited");
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
