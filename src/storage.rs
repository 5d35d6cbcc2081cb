//! Blob storage keyed by slash-separated paths.
//!
//! [`BlobStore`] is the contract the prescription coordinator depends on.
//! [`FsBlobStore`] keeps blobs under a root directory and issues links that are
//! only honoured until their expiry, checked by `GET /blobs/*path`.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("blob already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid blob path: {0}")]
    InvalidPath(String),
    #[error("blob storage error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` at `path`. Refuses to overwrite an existing blob.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError>;

    async fn get(&self, path: &str) -> Result<Vec<u8>, BlobError>;

    /// Removing a blob that is already gone succeeds.
    async fn remove(&self, path: &str) -> Result<(), BlobError>;

    /// Issues a URL for `path` that stops working after `ttl`.
    async fn sign(&self, path: &str, ttl: Duration) -> Result<String, BlobError>;
}

/// HMAC-SHA256 over `path` and `expires`, hex encoded.
#[derive(Clone)]
pub struct UrlSigner {
    mac: HmacSha256,
}

impl UrlSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, hmac::digest::InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret.as_ref())?,
        })
    }

    fn keyed(&self, path: &str, expires: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(path.as_bytes());
        mac.update(&[0]);
        mac.update(expires.to_string().as_bytes());
        mac
    }

    pub fn signature(&self, path: &str, expires: i64) -> String {
        hex::encode(self.keyed(path, expires).finalize().into_bytes())
    }

    pub fn verify(&self, path: &str, expires: i64, signature: &str, now: i64) -> bool {
        if now > expires {
            return false;
        }
        match hex::decode(signature) {
            Ok(bytes) => self.keyed(path, expires).verify_slice(&bytes).is_ok(),
            Err(_) => false,
        }
    }
}

pub struct FsBlobStore {
    root: PathBuf,
    public_url: String,
    signer: UrlSigner,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>, signer: UrlSigner) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into(),
            signer,
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let well_formed = !path.is_empty()
            && !path.contains('\\')
            && path
                .split('/')
                .all(|segment| !segment.is_empty() && segment != "." && segment != "..");

        if well_formed {
            Ok(self.root.join(Path::new(path)))
        } else {
            Err(BlobError::InvalidPath(path.to_string()))
        }
    }

    pub fn verify_link(&self, path: &str, expires: i64, signature: &str) -> bool {
        self.signer
            .verify(path, expires, signature, Utc::now().timestamp())
    }

    pub async fn open(&self, path: &str) -> Result<fs::File, BlobError> {
        let full = self.resolve(path)?;
        fs::File::open(&full).await.map_err(|err| not_found_or(err, path))
    }
}

/// Writes all of `bytes`, removing the file at `full` again if that fails so
/// no truncated blob is left behind.
async fn write_or_discard<W>(full: &Path, mut writer: W, bytes: &[u8]) -> Result<(), BlobError>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        writer.write_all(bytes).await?;
        writer.flush().await
    }
    .await;
    drop(writer);

    if let Err(err) = written {
        if let Err(cleanup) = fs::remove_file(full).await {
            tracing::warn!(path = %full.display(), error = %cleanup, "failed to discard partial blob");
        }
        return Err(err.into());
    }
    Ok(())
}

fn not_found_or(err: std::io::Error, path: &str) -> BlobError {
    if err.kind() == ErrorKind::NotFound {
        BlobError::NotFound(path.to_string())
    } else {
        BlobError::Io(err)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(BlobError::AlreadyExists(path.to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        write_or_discard(&full, file, bytes).await?;

        tracing::debug!(path, bytes = bytes.len(), "stored blob");
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let full = self.resolve(path)?;
        fs::read(&full).await.map_err(|err| not_found_or(err, path))
    }

    async fn remove(&self, path: &str) -> Result<(), BlobError> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full).await {
            Ok(()) => {
                tracing::debug!(path, "removed blob");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn sign(&self, path: &str, ttl: Duration) -> Result<String, BlobError> {
        let full = self.resolve(path)?;
        if !fs::try_exists(&full).await? {
            return Err(BlobError::NotFound(path.to_string()));
        }

        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let signature = self.signer.signature(path, expires);
        Ok(format!(
            "{}/blobs/{}?expires={}&signature={}",
            self.public_url, path, expires, signature
        ))
    }
}
