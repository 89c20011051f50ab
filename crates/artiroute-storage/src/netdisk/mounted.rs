use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::fs;

use super::{NetdiskCredentials, NetdiskSdk};
use crate::error::{StorageError, StorageResult};

/// Netdisk SDK backed by a locally mounted netdisk directory.
///
/// Remote paths are resolved under `mount_root`. Like the vendor SDK it keeps
/// the last configuration as shared state and refuses transfers before
/// `configure` has been called.
pub struct MountedNetdisk {
    mount_root: PathBuf,
    configured: RwLock<Option<NetdiskCredentials>>,
}

impl MountedNetdisk {
    pub fn new(mount_root: impl Into<PathBuf>) -> Self {
        Self {
            mount_root: mount_root.into(),
            configured: RwLock::new(None),
        }
    }

    fn ensure_configured(&self, operation: &'static str) -> StorageResult<()> {
        let configured = self.configured.read().map_err(|_| StorageError::Netdisk {
            operation,
            message: "configuration lock poisoned".to_string(),
        })?;
        if configured.is_none() {
            return Err(StorageError::Netdisk {
                operation,
                message: "sdk used before configure".to_string(),
            });
        }
        Ok(())
    }

    /// Map an absolute remote path onto the mount. `..` segments never escape it.
    fn mounted_path(&self, remote_path: &str) -> PathBuf {
        let mut path = self.mount_root.clone();
        for segment in remote_path.split('/') {
            match segment {
                "" | "." | ".." => {}
                other => path.push(other),
            }
        }
        path
    }
}

#[async_trait]
impl NetdiskSdk for MountedNetdisk {
    fn configure(&self, credentials: &NetdiskCredentials) -> StorageResult<()> {
        let mut configured = self.configured.write().map_err(|_| StorageError::Netdisk {
            operation: "configure",
            message: "configuration lock poisoned".to_string(),
        })?;
        *configured = Some(credentials.clone());
        tracing::debug!(
            is_svip = credentials.is_svip,
            log_path = %credentials.log_path,
            "Mounted netdisk configured"
        );
        Ok(())
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> StorageResult<()> {
        self.ensure_configured("upload")?;
        let target = self.mounted_path(remote_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| StorageError::Netdisk {
                operation: "upload",
                message: format!("failed to create {}: {}", parent.display(), e),
            })?;
        }
        fs::copy(local_path, &target)
            .await
            .map_err(|e| StorageError::Netdisk {
                operation: "upload",
                message: format!("{} -> {}: {}", local_path.display(), remote_path, e),
            })?;
        Ok(())
    }

    async fn download_file(&self, remote_path: &str, local_path: &Path) -> StorageResult<()> {
        self.ensure_configured("download")?;
        let source = self.mounted_path(remote_path);
        if !fs::try_exists(&source).await.unwrap_or(false) {
            return Err(StorageError::Netdisk {
                operation: "download",
                message: format!("remote file {} does not exist", remote_path),
            });
        }
        fs::copy(&source, local_path)
            .await
            .map_err(|e| StorageError::Netdisk {
                operation: "download",
                message: format!("{} -> {}: {}", remote_path, local_path.display(), e),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn credentials() -> NetdiskCredentials {
        NetdiskCredentials {
            access_token: "token".to_string(),
            is_svip: true,
            log_path: "logs/netdisk_sdk.log".to_string(),
        }
    }

    #[tokio::test]
    async fn refuses_transfers_before_configure() {
        let mount = tempdir().unwrap();
        let sdk = MountedNetdisk::new(mount.path());

        let result = sdk.upload_file(Path::new("/nope"), "/weights/a.pt").await;
        assert!(matches!(result, Err(StorageError::Netdisk { operation: "upload", .. })));
    }

    #[tokio::test]
    async fn upload_then_download_through_mount() {
        let mount = tempdir().unwrap();
        let work = tempdir().unwrap();
        let sdk = MountedNetdisk::new(mount.path());
        sdk.configure(&credentials()).unwrap();

        let local = work.path().join("demo.pt");
        std::fs::write(&local, b"weights").unwrap();
        sdk.upload_file(&local, "/project/weights/demo.pt").await.unwrap();
        assert!(mount.path().join("project/weights/demo.pt").is_file());

        let back = work.path().join("copy.pt");
        sdk.download_file("/project/weights/demo.pt", &back).await.unwrap();
        assert_eq!(std::fs::read(back).unwrap(), b"weights");
    }

    #[tokio::test]
    async fn download_of_missing_file_fails() {
        let mount = tempdir().unwrap();
        let work = tempdir().unwrap();
        let sdk = MountedNetdisk::new(mount.path());
        sdk.configure(&credentials()).unwrap();

        let result = sdk
            .download_file("/project/weights/missing.pt", &work.path().join("x"))
            .await;
        assert!(matches!(result, Err(StorageError::Netdisk { operation: "download", .. })));
    }

    #[test]
    fn mounted_path_stays_under_root() {
        let sdk = MountedNetdisk::new("/mnt/netdisk");
        assert_eq!(
            sdk.mounted_path("/../../etc/passwd"),
            PathBuf::from("/mnt/netdisk/etc/passwd")
        );
    }
}
