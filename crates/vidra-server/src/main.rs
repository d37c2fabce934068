use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use vidra_api::blob::HttpBlobStore;
use vidra_api::config::Config;
use vidra_api::routes;
use vidra_api::state::AppStateInner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidra=debug,vidra_api=debug,vidra_db=info,tower_http=debug".into()),
        )
        .init();

    // Config
    let config = Config::from_env()?;
    let addr = config.bind_address()?;

    // Init database
    let db = vidra_db::Database::open(&config.db_path)?;

    // Shared state
    let blobs = Arc::new(HttpBlobStore::new(
        config.blob_upload_url.clone(),
        config.upload_dir.clone(),
    ));
    let state = AppStateInner::new(config, db, blobs);

    let app = routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Vidra server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Vidra server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
