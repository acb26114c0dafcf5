//! Object storage for media blobs.
//!
//! Blobs are addressed by the media id: `blobs/{aa}/{bb}/{uuid}.bin`, where
//! `aa`/`bb` are the first hex bytes of the id. Metadata (filename, content
//! type, hash) lives in the `media` table, never next to the bytes.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use plinth_core::{Error, Result};

/// Where media bytes are kept.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write data to the specified path, replacing any existing blob.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read data from the specified path. Missing blobs are `NotFound`.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete data at the specified path. Deleting a missing blob succeeds.
    async fn delete(&self, path: &str) -> Result<()>;

    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Local-disk storage backend rooted at one directory.
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Resolve a relative storage path, refusing anything that could escape
    /// the base directory.
    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::Storage(format!("invalid storage path '{}'", path)));
        }
        Ok(self.base_path.join(relative))
    }

    /// Round-trip a small file so permission problems surface at startup
    /// instead of on the first upload.
    pub async fn validate(&self) -> Result<()> {
        let check_path = format!("blobs/.health-check/{}.bin", Uuid::new_v4());
        let data = b"storage-health-check";

        self.write(&check_path, data).await?;
        let read_back = self.read(&check_path).await?;
        self.delete(&check_path).await?;

        if read_back != data {
            return Err(Error::Storage("storage read-back mismatch".to_string()));
        }
        if let Ok(dir) = self.full_path("blobs/.health-check") {
            let _ = fs::remove_dir(dir).await;
        }
        Ok(())
    }
}

fn storage_error(op: &str, path: &Path, e: std::io::Error) -> Error {
    warn!(subsystem = "storage", op, path = %path.display(), error = %e, "Storage operation failed");
    Error::Storage(format!("{} {}: {}", op, path.display(), e))
}

/// Create, fill and flush a temp file. The handle is closed on return.
async fn write_temp(temp_path: &Path, data: &[u8]) -> Result<()> {
    let mut file = fs::File::create(temp_path)
        .await
        .map_err(|e| storage_error("create", temp_path, e))?;
    file.write_all(data)
        .await
        .map_err(|e| storage_error("write", temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| storage_error("sync", temp_path, e))
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path)?;
        debug!(subsystem = "storage", op = "write", storage_path = %path, size_bytes = data.len(), "Writing blob");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error("create_dir", parent, e))?;
        }

        // Write to a sibling temp file and rename so readers never observe a
        // partial blob.
        let temp_path = full_path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        if let Err(e) = write_temp(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, &full_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(storage_error("rename", &full_path, e));
        }

        // rw-r--r--: uploaded bytes are never executable.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644))
                .await
                .map_err(|e| storage_error("chmod", &full_path, e))?;
        }

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("blob {} not found", path)))
            }
            Err(e) => Err(storage_error("read", &full_path, e)),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("delete", &full_path, e)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path)?;
        fs::try_exists(&full_path)
            .await
            .map_err(|e| storage_error("stat", &full_path, e))
    }
}

/// BLAKE3 digest of the data as `blake3:{64-char-hex}`.
pub fn compute_content_hash(data: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(data).to_hex())
}

/// Storage path for a media id.
///
/// Example: `blobs/01/94/01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f.bin`
pub fn generate_storage_path(id: &Uuid) -> String {
    let hex = id.simple().to_string();
    format!(
        "blobs/{}/{}/{}.bin",
        &hex[0..2],
        &hex[2..4],
        id.as_hyphenated()
    )
}
