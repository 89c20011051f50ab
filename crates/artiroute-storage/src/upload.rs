//! Upload orchestration: always land the stream on the local backend root,
//! then push the local copy to the cloud netdisk when the target is cloud,
//! and to a core server when one is named or implied by the storage server.

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use artiroute_core::{ArtifactCategory, StorageBackend, TransferResult, UploadResult};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt, BufReader};

use crate::directory::ServerDirectory;
use crate::error::{StorageError, StorageResult};
use crate::locations::is_local_label;
use crate::netdisk::CloudTransferClient;
use crate::paths::{generate_stored_file_name, normalize_backend, ArtifactPathResolver};
use crate::sftp::SftpTransferEngine;

const DEFAULT_STORAGE_SERVER: &str = "backend";

/// Inbound file: the client-supplied name plus its byte stream.
pub struct UploadSource {
    pub file_name: String,
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl UploadSource {
    pub fn new(file_name: impl Into<String>, reader: impl AsyncRead + Send + 'static) -> Self {
        Self {
            file_name: file_name.into(),
            reader: Box::pin(reader),
        }
    }

    /// Stream an existing local file.
    pub async fn from_path(path: &Path) -> StorageResult<Self> {
        let file = fs::File::open(path)
            .await
            .map_err(|e| StorageError::io(format!("opening {}", path.display()), e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(file_name, file))
    }
}

/// Where and how to store an upload.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub category: Option<ArtifactCategory>,
    pub desired_name: String,
    pub requested_backend: String,
    pub storage_server: String,
    pub force_cloud: bool,
    /// Explicit core server key; see [`UploadRequest::core_server_key`].
    pub core_server_key: String,
    pub ssh_user: Option<String>,
    pub ssh_private_key_path: Option<String>,
}

impl UploadRequest {
    pub fn new(category: ArtifactCategory) -> Self {
        Self {
            category: Some(category),
            ..Default::default()
        }
    }

    /// Target backend after applying the override order.
    pub fn effective_backend(&self) -> StorageResult<StorageBackend> {
        if self.force_cloud {
            return Ok(StorageBackend::CloudNetdisk);
        }
        if !self.requested_backend.trim().is_empty() {
            return normalize_backend(&self.requested_backend);
        }
        if StorageBackend::is_cloud_label(&self.storage_server) {
            return Ok(StorageBackend::CloudNetdisk);
        }
        Ok(StorageBackend::Backend)
    }

    /// Core server to push the saved copy to: the explicit key, else the
    /// storage-server label when it names neither this host nor the cloud.
    pub fn core_server_key(&self) -> Option<String> {
        let explicit = self.core_server_key.trim();
        if !explicit.is_empty() {
            return Some(explicit.to_string());
        }
        let label = self.storage_server.trim();
        if is_local_label(label) || StorageBackend::is_cloud_label(label) {
            return None;
        }
        tracing::info!(storage_server = %label, "Core server key auto-selected from storage server");
        Some(label.to_string())
    }

    fn storage_server_label(&self) -> String {
        let label = self.storage_server.trim();
        if label.is_empty() {
            DEFAULT_STORAGE_SERVER.to_string()
        } else {
            label.to_string()
        }
    }
}

struct CorePush {
    engine: Arc<SftpTransferEngine>,
    directory: Arc<dyn ServerDirectory>,
}

pub struct ArtifactUploader {
    paths: ArtifactPathResolver,
    cloud: Option<Arc<CloudTransferClient>>,
    core: Option<CorePush>,
}

impl ArtifactUploader {
    pub fn new(paths: ArtifactPathResolver, cloud: Option<Arc<CloudTransferClient>>) -> Self {
        Self {
            paths,
            cloud,
            core: None,
        }
    }

    /// Enable pushing saved uploads to core servers from `directory`.
    pub fn with_core_push(
        mut self,
        engine: Arc<SftpTransferEngine>,
        directory: Arc<dyn ServerDirectory>,
    ) -> Self {
        self.core = Some(CorePush { engine, directory });
        self
    }

    /// Save an upload.
    ///
    /// A cloud or core push failure fails the call but leaves the local copy
    /// in place; the caller decides whether to keep or clean it up.
    pub async fn save(
        &self,
        source: UploadSource,
        request: &UploadRequest,
    ) -> StorageResult<UploadResult> {
        let category = request.category.ok_or_else(|| {
            StorageError::InvalidCategory("category is required".to_string())
        })?;
        if source.file_name.trim().is_empty() {
            return Err(StorageError::InvalidUploadFile(
                "uploaded file has no name".to_string(),
            ));
        }

        let mut reader = BufReader::new(source.reader);
        let backend = request.effective_backend()?;
        let storage_server = request.storage_server_label();
        let stored_name = generate_stored_file_name(&request.desired_name, &source.file_name)?;
        let paths = self.paths.build_all_paths(category, &stored_name)?;
        let local_path = paths.backend.clone();

        let start = Instant::now();
        let size = write_local(Path::new(&local_path), &mut reader).await?;

        tracing::info!(
            stored_name = %stored_name,
            category = %category,
            local_path = %local_path,
            size,
            backend = %backend,
            storage_server = %storage_server,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Artifact written to backend root"
        );

        let cloud_requested = backend == StorageBackend::CloudNetdisk;
        let mut cloud_remote_path = None;
        if cloud_requested {
            let client = self.cloud.as_ref().ok_or_else(|| {
                StorageError::ConfigError("cloud netdisk client is not configured".to_string())
            })?;
            let remote_dir = self
                .paths
                .resolve_root(category, StorageBackend::CloudNetdisk)?;
            let remote = client
                .upload(Path::new(&local_path), remote_dir)
                .await
                .inspect_err(|e| {
                    tracing::error!(
                        error = %e,
                        stored_name = %stored_name,
                        local_path = %local_path,
                        "Cloud push failed, local copy kept"
                    );
                })?;
            cloud_remote_path = Some(remote);
        }

        let core_server_key = request.core_server_key();
        let core_transfer = match &core_server_key {
            Some(key) => Some(
                self.push_to_core(key, Path::new(&local_path), category, request)
                    .await?,
            ),
            None => {
                tracing::debug!(stored_name = %stored_name, "Core push skipped, no core server key");
                None
            }
        };

        Ok(UploadResult {
            stored_name,
            local_path,
            paths,
            size,
            storage_server,
            backend,
            cloud_requested,
            cloud_uploaded: cloud_remote_path.is_some(),
            cloud_remote_path,
            core_server_key,
            core_transfer,
        })
    }

    async fn push_to_core(
        &self,
        key: &str,
        local_path: &Path,
        category: ArtifactCategory,
        request: &UploadRequest,
    ) -> StorageResult<TransferResult> {
        let core = self.core.as_ref().ok_or_else(|| {
            StorageError::ConfigError("core server push is not configured".to_string())
        })?;
        core.engine
            .push_to_core_server(
                core.directory.as_ref(),
                key,
                local_path,
                category,
                request.ssh_user.as_deref(),
                request.ssh_private_key_path.as_deref(),
            )
            .await
            .inspect_err(|e| {
                tracing::error!(
                    error = %e,
                    core_server_key = %key,
                    local_path = %local_path.display(),
                    "Core push failed, local copy kept"
                );
            })
    }
}

/// Write the whole stream to `path`, creating parent directories, then fsync.
async fn write_local<R>(path: &Path, reader: &mut R) -> StorageResult<u64>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(format!("creating {}", parent.display()), e))?;
    }

    let mut file = fs::File::create(path)
        .await
        .map_err(|e| StorageError::io(format!("creating {}", path.display()), e))?;
    let size = tokio::io::copy_buf(reader, &mut file)
        .await
        .map_err(|e| StorageError::io(format!("writing {}", path.display()), e))?;
    file.flush()
        .await
        .map_err(|e| StorageError::io(format!("flushing {}", path.display()), e))?;
    file.sync_all()
        .await
        .map_err(|e| StorageError::io(format!("syncing {}", path.display()), e))?;
    Ok(size)
}
