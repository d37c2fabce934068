use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("reading local file: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("blob service rejected the upload with status {0}")]
    Rejected(u16),
    #[error("{0} is not inside the staging directory")]
    OutsideStaging(String),
}

/// Opaque asset storage: takes a staged local file, hands back a public URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, local_path: &Path) -> Result<String, BlobError>;
}

/// Writes request bytes to a fresh, server-named file under `dir`. Only
/// paths produced here are ever handed to a `BlobStore`.
pub async fn stage(dir: &Path, bytes: &[u8]) -> Result<PathBuf, BlobError> {
    tokio::fs::create_dir_all(dir).await?;

    let path = dir.join(Uuid::new_v4().to_string());
    let mut file = tokio::fs::File::create(&path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(path)
}

#[derive(Deserialize)]
struct UploadReply {
    url: String,
}

/// Posts the raw file bytes to an HTTP upload endpoint that answers with
/// `{ "url": "..." }`. Only files inside `staging_dir` are accepted; those
/// are removed afterwards whether or not the upload went through.
pub struct HttpBlobStore {
    client: reqwest::Client,
    upload_url: String,
    staging_dir: PathBuf,
}

impl HttpBlobStore {
    pub fn new(upload_url: impl Into<String>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_url: upload_url.into(),
            staging_dir: staging_dir.into(),
        }
    }

    async fn ensure_staged(&self, local_path: &Path) -> Result<(), BlobError> {
        let dir = tokio::fs::canonicalize(&self.staging_dir).await?;
        let file = tokio::fs::canonicalize(local_path).await?;

        if file == dir || !file.starts_with(&dir) {
            return Err(BlobError::OutsideStaging(local_path.display().to_string()));
        }
        Ok(())
    }

    async fn send(&self, local_path: &Path) -> Result<String, BlobError> {
        let bytes = tokio::fs::read(local_path).await?;
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let response = self
            .client
            .post(&self.upload_url)
            .query(&[("fileName", file_name.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BlobError::Rejected(response.status().as_u16()));
        }

        let reply: UploadReply = response.json().await?;
        Ok(reply.url)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, local_path: &Path) -> Result<String, BlobError> {
        if let Err(e) = self.ensure_staged(local_path).await {
            warn!("Refusing upload of {}: {}", local_path.display(), e);
            return Err(e);
        }

        let result = self.send(local_path).await;

        if let Err(e) = tokio::fs::remove_file(local_path).await {
            warn!("Failed to remove local upload {}: {}", local_path.display(), e);
        }

        if let Ok(url) = &result {
            info!("Uploaded {} to {}", local_path.display(), url);
        }
        result
    }
}
