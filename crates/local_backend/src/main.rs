use std::net::SocketAddr;

use clap::Parser;
use local_backend::{
    config::LocalConfig,
    make_app,
    persistence::connect_store,
    router::router,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = LocalConfig::parse();

    // RUST_LOG wins over the flag when both are set.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting CollabLite backend with config {config:?}");
    let store = connect_store(config.store, &config.db_spec)?;
    let st = make_app(store, config.router_options());
    let app = router(st);

    let addr = SocketAddr::from(config.http_bind_address());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("CollabLite backend listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl-C signal, shutting down");
        })
        .await?;

    tracing::info!("Server successfully shut down");
    Ok(())
}
