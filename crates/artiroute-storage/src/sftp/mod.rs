//! SSH/SFTP transfer engine.
//!
//! The only long-lived state is the server registry. Each operation opens a
//! fresh session on the blocking pool and closes it whether the work
//! succeeded or not.

mod server;
mod session;

pub use server::{ServerConfig, ServerRegistry, DEFAULT_SSH_PORT, DEFAULT_SSH_TIMEOUT};
pub use session::{RemoteSession, RemoteSessionFactory};
#[cfg(feature = "transfer-ssh2")]
pub use session::{Ssh2Session, Ssh2SessionFactory};

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use artiroute_core::{
    ArtifactCategory, RemoteSearchResult, StorageBackend, TransferDirection, TransferResult,
};

use crate::directory::ServerDirectory;
use crate::error::{StorageError, StorageResult};
use crate::paths::{normalize_artifact_file_name, normalize_remote_path, ArtifactPathResolver};

const DEFAULT_PUSH_USER: &str = "root";

pub struct SftpTransferEngine {
    paths: ArtifactPathResolver,
    servers: ServerRegistry,
    factory: Arc<dyn RemoteSessionFactory>,
}

impl SftpTransferEngine {
    pub fn new(
        paths: ArtifactPathResolver,
        default_server: ServerConfig,
        factory: Arc<dyn RemoteSessionFactory>,
    ) -> Self {
        Self {
            paths,
            servers: ServerRegistry::new(default_server),
            factory,
        }
    }

    /// Engine backed by real ssh2 sessions.
    #[cfg(feature = "transfer-ssh2")]
    pub fn with_ssh2(paths: ArtifactPathResolver, defaults: &artiroute_core::SshDefaults) -> Self {
        Self::new(
            paths,
            ServerConfig::from_defaults(defaults),
            Arc::new(Ssh2SessionFactory),
        )
    }

    pub fn paths(&self) -> &ArtifactPathResolver {
        &self.paths
    }

    pub fn servers(&self) -> &ServerRegistry {
        &self.servers
    }

    pub fn set_server_config(&self, name: &str, cfg: ServerConfig) -> StorageResult<ServerConfig> {
        self.servers.set(name, cfg)
    }

    pub fn resolve_server(&self, name: &str, port_override: u32) -> StorageResult<ServerConfig> {
        self.servers.resolve(name, port_override)
    }

    /// Run `work` inside one session on the blocking pool. The session is always closed.
    async fn with_session<T, F>(
        &self,
        server: &ServerConfig,
        operation: &'static str,
        work: F,
    ) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn RemoteSession) -> StorageResult<T> + Send + 'static,
    {
        let factory = self.factory.clone();
        let server = server.clone();
        let server_name = server.name.clone();

        tokio::task::spawn_blocking(move || {
            let mut session = factory.open(&server).inspect_err(|e| {
                tracing::error!(
                    error = %e,
                    server_name = %server.name,
                    address = %server.address(),
                    operation,
                    "Failed to open SFTP session"
                );
            })?;
            let result = work(session.as_mut());
            if let Err(e) = session.close() {
                tracing::warn!(error = %e, server_name = %server.name, operation, "Failed to close SFTP session");
            }
            result
        })
        .await
        .map_err(|e| StorageError::Ssh {
            server: server_name,
            message: format!("{} task failed: {}", operation, e),
        })?
    }

    /// Upload a local regular file to an absolute remote path.
    pub async fn upload_file_by_path(
        &self,
        local_path: &Path,
        remote_path: &str,
        server_name: &str,
        port: u32,
    ) -> StorageResult<TransferResult> {
        if local_path.as_os_str().is_empty() {
            return Err(StorageError::FilePathRequired("local path"));
        }
        if remote_path.trim().is_empty() {
            return Err(StorageError::FilePathRequired("remote path"));
        }
        let remote_path = normalize_remote_path(remote_path)?;
        ensure_local_regular_file(local_path).await?;
        let server = self.resolve_server(server_name, port)?;

        tracing::info!(
            server_name = %server.name,
            server_ip = %server.host,
            port = server.port,
            local_path = %local_path.display(),
            remote_path = %remote_path,
            "Starting SFTP upload"
        );

        let start = Instant::now();
        let local = local_path.to_path_buf();
        let remote = remote_path.clone();
        let bytes = self
            .with_session(&server, "upload", move |session| {
                session.upload_file(&local, &remote)
            })
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, server_name = %server.name, remote_path = %remote_path, "SFTP upload failed");
            })?;

        tracing::info!(
            server_name = %server.name,
            remote_path = %remote_path,
            bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "SFTP upload successful"
        );

        Ok(transfer_result(
            &server,
            TransferDirection::Upload,
            local_path.display().to_string(),
            remote_path,
            bytes,
            start,
        ))
    }

    /// Download an absolute remote path. The remote file is checked before anything local is touched.
    pub async fn download_file_by_path(
        &self,
        remote_path: &str,
        local_path: &Path,
        server_name: &str,
        port: u32,
    ) -> StorageResult<TransferResult> {
        if remote_path.trim().is_empty() {
            return Err(StorageError::FilePathRequired("remote path"));
        }
        if local_path.as_os_str().is_empty() {
            return Err(StorageError::FilePathRequired("local path"));
        }
        let remote_path = normalize_remote_path(remote_path)?;
        let server = self.resolve_server(server_name, port)?;

        tracing::info!(
            server_name = %server.name,
            server_ip = %server.host,
            port = server.port,
            remote_path = %remote_path,
            local_path = %local_path.display(),
            "Starting SFTP download"
        );

        let start = Instant::now();
        let local = local_path.to_path_buf();
        let remote = remote_path.clone();
        let name = server.name.clone();
        let bytes = self
            .with_session(&server, "download", move |session| {
                if !session.file_exists(&remote)? {
                    return Err(StorageError::RemoteArtifactNotFound {
                        server: name,
                        path: remote,
                    });
                }
                if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StorageError::io(format!("creating {}", parent.display()), e)
                    })?;
                }
                session.download_file(&remote, &local)
            })
            .await
            .inspect_err(|e| {
                if e.is_not_found() {
                    tracing::warn!(server_name = %server.name, remote_path = %remote_path, "Remote file not found");
                } else {
                    tracing::error!(error = %e, server_name = %server.name, remote_path = %remote_path, "SFTP download failed");
                }
            })?;

        tracing::info!(
            server_name = %server.name,
            remote_path = %remote_path,
            bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "SFTP download successful"
        );

        Ok(transfer_result(
            &server,
            TransferDirection::Download,
            remote_path,
            local_path.display().to_string(),
            bytes,
            start,
        ))
    }

    /// Check both other-remote roots for `file_name` over one session.
    pub async fn search_in_other_roots(
        &self,
        file_name: &str,
        server_name: &str,
        port: u32,
    ) -> StorageResult<RemoteSearchResult> {
        let file_name = normalize_artifact_file_name(file_name)?;
        let weights_path =
            self.paths
                .build_path(ArtifactCategory::Weights, StorageBackend::OtherRemote, &file_name)?;
        let datasets_path =
            self.paths
                .build_path(ArtifactCategory::Datasets, StorageBackend::OtherRemote, &file_name)?;
        let server = self.resolve_server(server_name, port)?;

        let (w, d) = (weights_path.clone(), datasets_path.clone());
        let (exists_in_weights, exists_in_datasets) = self
            .with_session(&server, "search", move |session| {
                Ok((session.file_exists(&w)?, session.file_exists(&d)?))
            })
            .await?;

        let matched_remote_path = match (exists_in_weights, exists_in_datasets) {
            (true, false) => Some(weights_path.clone()),
            (false, true) => Some(datasets_path.clone()),
            _ => None,
        };

        tracing::info!(
            server_name = %server.name,
            file_name = %file_name,
            exists_in_weights,
            exists_in_datasets,
            "Searched remote artifact roots"
        );

        Ok(RemoteSearchResult {
            server_name: server.name,
            server_ip: server.host,
            file_name,
            weights_path,
            datasets_path,
            exists_in_weights,
            exists_in_datasets,
            any_exists: exists_in_weights || exists_in_datasets,
            matched_remote_path,
        })
    }

    /// Push a local backend artifact to the same category on the remote server.
    pub async fn upload_artifact_by_name(
        &self,
        file_name: &str,
        server_name: &str,
        port: u32,
    ) -> StorageResult<TransferResult> {
        let file_name = normalize_artifact_file_name(file_name)?;
        let (category, local_path) = self.resolve_local_backend_file(&file_name).await?;

        let search = self.search_in_other_roots(&file_name, server_name, port).await?;
        let remote_path =
            self.paths
                .build_path(category, StorageBackend::OtherRemote, &file_name)?;
        if search.exists_in(category) {
            tracing::warn!(
                server_name = %search.server_name,
                remote_path = %remote_path,
                "Remote artifact already exists"
            );
            return Err(StorageError::RemoteArtifactAlreadyExists {
                server: search.server_name,
                path: remote_path,
            });
        }

        let result = self
            .upload_file_by_path(&local_path, &remote_path, server_name, port)
            .await?;
        Ok(result.with_artifact(category, &file_name))
    }

    /// Pull a remote artifact into the matching local backend root.
    pub async fn download_artifact_by_name(
        &self,
        file_name: &str,
        server_name: &str,
        port: u32,
    ) -> StorageResult<TransferResult> {
        let file_name = normalize_artifact_file_name(file_name)?;
        let search = self.search_in_other_roots(&file_name, server_name, port).await?;

        let category = match search.matched_category() {
            Some(category) => category,
            None if search.any_exists => {
                tracing::warn!(server_name = %search.server_name, file_name = %file_name, "Artifact found in both remote roots");
                return Err(StorageError::ConflictInRemoteRoots {
                    server: search.server_name,
                    file_name,
                });
            }
            None => {
                tracing::warn!(server_name = %search.server_name, file_name = %file_name, "Artifact not found in remote roots");
                return Err(StorageError::NotFoundInRemoteRoots {
                    server: search.server_name,
                    file_name,
                });
            }
        };
        let remote_path = match category {
            ArtifactCategory::Weights => search.weights_path,
            ArtifactCategory::Datasets => search.datasets_path,
        };

        let local_path = self
            .paths
            .build_path(category, StorageBackend::Backend, &file_name)?;
        let result = self
            .download_file_by_path(&remote_path, Path::new(&local_path), server_name, port)
            .await?;
        Ok(result.with_artifact(category, &file_name))
    }

    /// Upload a local file to a server from the core directory.
    ///
    /// The directory entry is registered under `server_key` with `user`
    /// (default `root`) and `private_key_path` (default identity's key) before
    /// the upload, so later calls by key reuse it.
    pub async fn push_to_core_server(
        &self,
        directory: &dyn ServerDirectory,
        server_key: &str,
        local_path: &Path,
        category: ArtifactCategory,
        user: Option<&str>,
        private_key_path: Option<&str>,
    ) -> StorageResult<TransferResult> {
        let entry = directory.get(server_key).await?;

        let user = user
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_PUSH_USER);
        let key_path = match private_key_path.map(str::trim).filter(|k| !k.is_empty()) {
            Some(path) => path.to_string(),
            None => self.servers.default_server().private_key_path.clone(),
        };

        let mut cfg = ServerConfig::new(&entry.ip, entry.port, user, &key_path);
        cfg.timeout = self.servers.default_server().timeout;
        self.set_server_config(&entry.key, cfg)?;

        let file_name = normalize_artifact_file_name(&local_path.to_string_lossy())?;
        let remote_path =
            self.paths
                .build_path(category, StorageBackend::OtherRemote, &file_name)?;

        tracing::info!(
            core_server_key = %entry.key,
            server_ip = %entry.ip,
            category = %category,
            remote_path = %remote_path,
            "Pushing artifact to core server"
        );

        let result = self
            .upload_file_by_path(local_path, &remote_path, &entry.key, entry.port)
            .await?;
        Ok(result.with_artifact(category, &file_name))
    }

    /// Locate `file_name` under exactly one local backend root.
    async fn resolve_local_backend_file(
        &self,
        file_name: &str,
    ) -> StorageResult<(ArtifactCategory, PathBuf)> {
        let mut hits = Vec::with_capacity(ArtifactCategory::ALL.len());
        for category in ArtifactCategory::ALL {
            let path = self
                .paths
                .build_path(category, StorageBackend::Backend, file_name)?;
            match tokio::fs::metadata(&path).await {
                Ok(meta) => hits.push((category, PathBuf::from(path), meta.is_file())),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::io(format!("checking {}", path), e)),
            }
        }

        match hits.as_slice() {
            [] => {
                tracing::warn!(file_name = %file_name, "Artifact not found in backend roots");
                Err(StorageError::NotFoundInBackendRoots {
                    file_name: file_name.to_string(),
                })
            }
            [(category, path, true)] => Ok((*category, path.clone())),
            [(_, path, false)] => Err(StorageError::NotRegularFile(path.display().to_string())),
            _ => {
                tracing::warn!(file_name = %file_name, "Artifact found in both backend roots");
                Err(StorageError::ConflictInBackendRoots {
                    file_name: file_name.to_string(),
                })
            }
        }
    }
}

async fn ensure_local_regular_file(path: &Path) -> StorageResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(StorageError::NotRegularFile(path.display().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(local_path = %path.display(), "Local file not found");
            Err(StorageError::LocalFileNotFound(path.display().to_string()))
        }
        Err(e) => Err(StorageError::io(format!("checking {}", path.display()), e)),
    }
}

fn transfer_result(
    server: &ServerConfig,
    direction: TransferDirection,
    source_path: String,
    target_path: String,
    bytes: u64,
    start: Instant,
) -> TransferResult {
    TransferResult {
        server_name: server.name.clone(),
        server_ip: server.host.clone(),
        direction,
        category: None,
        file_name: None,
        source_path,
        target_path,
        bytes,
        duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}
