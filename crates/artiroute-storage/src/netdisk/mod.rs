//! Cloud netdisk transfer client.
//!
//! The vendor SDK keeps its credentials in process-global state that must be
//! set with `configure` immediately before each transfer. The client holds one
//! async mutex across configure + transfer so concurrent callers never observe
//! each other's configuration.

mod mounted;

pub use mounted::MountedNetdisk;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use artiroute_core::NetdiskConfig;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{StorageError, StorageResult};
use crate::paths::{normalize_artifact_file_name, normalize_remote_path};

/// Credentials passed to the SDK before each call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetdiskCredentials {
    pub access_token: String,
    pub is_svip: bool,
    pub log_path: String,
}

impl NetdiskCredentials {
    pub fn from_config(config: &NetdiskConfig) -> Self {
        let log_path = config.log_path.trim();
        Self {
            access_token: config
                .access_token
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            is_svip: config.is_svip,
            log_path: if log_path.is_empty() {
                "logs/netdisk_sdk.log".to_string()
            } else {
                log_path.to_string()
            },
        }
    }
}

/// Vendor SDK contract: global configure, then whole-file upload or download.
#[async_trait]
pub trait NetdiskSdk: Send + Sync {
    fn configure(&self, credentials: &NetdiskCredentials) -> StorageResult<()>;

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> StorageResult<()>;

    async fn download_file(&self, remote_path: &str, local_path: &Path) -> StorageResult<()>;
}

/// One-file-at-a-time adapter around a [`NetdiskSdk`].
pub struct CloudTransferClient {
    credentials: NetdiskCredentials,
    sdk: Arc<dyn NetdiskSdk>,
    lock: Mutex<()>,
}

impl CloudTransferClient {
    pub fn new(credentials: NetdiskCredentials, sdk: Arc<dyn NetdiskSdk>) -> Self {
        Self {
            credentials,
            sdk,
            lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &NetdiskConfig, sdk: Arc<dyn NetdiskSdk>) -> Self {
        Self::new(NetdiskCredentials::from_config(config), sdk)
    }

    fn ensure_credentials(&self) -> StorageResult<()> {
        if self.credentials.access_token.trim().is_empty() {
            return Err(StorageError::CredentialRequired(
                "netdisk access token is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Upload `local_path` into `remote_dir`, returning the remote file path.
    pub async fn upload(&self, local_path: &Path, remote_dir: &str) -> StorageResult<String> {
        self.ensure_credentials()?;

        let remote_dir = normalize_remote_path(remote_dir)?;
        let base_name = normalize_artifact_file_name(&local_path.to_string_lossy()).map_err(|_| {
            StorageError::InvalidUploadFile(format!(
                "local path {} has no usable file name",
                local_path.display()
            ))
        })?;
        let remote_path = format!("{}/{}", remote_dir, base_name);

        let _guard = self.lock.lock().await;
        let start = Instant::now();

        self.sdk.configure(&self.credentials)?;
        if let Err(e) = self.sdk.upload_file(local_path, &remote_path).await {
            tracing::error!(
                error = %e,
                local_path = %local_path.display(),
                remote_path = %remote_path,
                "Netdisk upload failed"
            );
            return Err(e);
        }

        tracing::info!(
            local_path = %local_path.display(),
            remote_path = %remote_path,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Netdisk upload successful"
        );

        Ok(remote_path)
    }

    /// Download `remote_path` to `local_path`, creating local parent directories.
    pub async fn download(&self, remote_path: &str, local_path: &Path) -> StorageResult<()> {
        self.ensure_credentials()?;

        let remote_path = normalize_remote_path(remote_path)?;
        if local_path.as_os_str().is_empty() {
            return Err(StorageError::FilePathRequired("local path"));
        }
        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::io(format!("creating {}", parent.display()), e)
            })?;
        }

        let _guard = self.lock.lock().await;
        let start = Instant::now();

        self.sdk.configure(&self.credentials)?;
        if let Err(e) = self.sdk.download_file(&remote_path, local_path).await {
            tracing::error!(
                error = %e,
                remote_path = %remote_path,
                local_path = %local_path.display(),
                "Netdisk download failed"
            );
            return Err(e);
        }

        tracing::info!(
            remote_path = %remote_path,
            local_path = %local_path.display(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Netdisk download successful"
        );

        Ok(())
    }
}
