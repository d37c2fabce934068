use std::sync::Arc;

use tracing::error;
use vidra_db::Database;

use crate::error::ApiError;

/// Runs a database call off the async runtime. Every store access goes
/// through here, so each one is a suspension point the request can be
/// dropped at.
pub async fn run<F, T>(db: &Arc<Database>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Unexpected("background task failed".into())
        })?
        .map_err(ApiError::Persistence)
}
