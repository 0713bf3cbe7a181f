use std::net::SocketAddr;

use routerfleet_engine::config::Config;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    routerfleet_engine::init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let (router, scheduler) = match routerfleet_engine::build_app(&config).await {
        Ok(app) => app,
        Err(e) => {
            error!("failed to start application: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = scheduler.lock().await.start().await {
        error!("failed to start scheduler: {}", e);
        std::process::exit(1);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server error: {}", e);
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
