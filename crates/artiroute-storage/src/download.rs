//! Download orchestration: serve from the local backend root, pulling the
//! cloud copy first when the record says the cloud holds one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use artiroute_core::{
    ArtifactCategory, ArtifactKind, CloudDownloadResult, StorageAction, StorageBackend,
};

use crate::error::{StorageError, StorageResult};
use crate::locations;
use crate::netdisk::CloudTransferClient;
use crate::paths::{
    derive_file_name, normalize_artifact_file_name, normalize_remote_path, remote_base_name,
    ArtifactPathResolver,
};
use crate::records::ArtifactRecordStore;

const LOCAL_LOCATION: &str = "backend";

/// Record whose Location Set gains `local_label` after a cloud pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSync {
    pub kind: ArtifactKind,
    pub id: i64,
    pub local_label: String,
}

impl RecordSync {
    pub fn new(kind: ArtifactKind, id: i64) -> Self {
        Self {
            kind,
            id,
            local_label: LOCAL_LOCATION.to_string(),
        }
    }

    /// Override the label; blank keeps `backend`.
    pub fn with_label(mut self, label: &str) -> Self {
        let label = label.trim();
        if !label.is_empty() {
            self.local_label = label.to_string();
        }
        self
    }
}

pub struct ArtifactDownloader {
    paths: ArtifactPathResolver,
    cloud: Option<Arc<CloudTransferClient>>,
    records: Arc<dyn ArtifactRecordStore>,
}

impl ArtifactDownloader {
    pub fn new(
        paths: ArtifactPathResolver,
        cloud: Option<Arc<CloudTransferClient>>,
        records: Arc<dyn ArtifactRecordStore>,
    ) -> Self {
        Self {
            paths,
            cloud,
            records,
        }
    }

    fn cloud(&self) -> StorageResult<&CloudTransferClient> {
        self.cloud.as_deref().ok_or_else(|| {
            StorageError::ConfigError("cloud netdisk client is not configured".to_string())
        })
    }

    /// Local path of a record's artifact, pulled from the cloud if needed.
    ///
    /// After a successful pull `backend` is added to the record's Location Set.
    pub async fn fetch_local(&self, kind: ArtifactKind, id: i64) -> StorageResult<PathBuf> {
        let stored = self.records.file_name(kind, id).await?;
        let file_name = derive_file_name(&stored, "").ok_or_else(|| {
            StorageError::EmptyFileName(format!("{} {} has no file name", kind, id))
        })?;
        let category = kind.category();
        let local_path = PathBuf::from(self.paths.build_path(
            category,
            StorageBackend::Backend,
            &file_name,
        )?);

        if is_regular_file(&local_path).await {
            tracing::debug!(kind = %kind, id, local_path = %local_path.display(), "Serving local copy");
            return Ok(local_path);
        }

        let servers = self.records.locations(kind, id).await?;
        if !locations::contains_cloud(&servers) {
            tracing::warn!(kind = %kind, id, file_name = %file_name, "Artifact has no local or cloud copy");
            return Err(StorageError::ArtifactUnavailable { file_name });
        }

        let remote_path =
            self.paths
                .build_path(category, StorageBackend::CloudNetdisk, &file_name)?;
        self.cloud()?.download(&remote_path, &local_path).await?;

        if !is_regular_file(&local_path).await {
            tracing::error!(
                kind = %kind,
                id,
                remote_path = %remote_path,
                local_path = %local_path.display(),
                "Cloud pull reported success but no local file exists"
            );
            return Err(StorageError::ArtifactUnavailable { file_name });
        }

        let updated = self
            .records
            .update_locations(kind, id, StorageAction::Add, &[LOCAL_LOCATION.to_string()])
            .await?;

        tracing::info!(
            kind = %kind,
            id,
            remote_path = %remote_path,
            local_path = %local_path.display(),
            storage_servers = ?updated,
            "Pulled cloud copy to backend root"
        );
        Ok(local_path)
    }

    /// Pull an arbitrary netdisk file into the category's local backend root.
    ///
    /// The local name is `file_name` when given, else the remote basename.
    /// With `sync`, the record's Location Set gains the local label once the
    /// file is on disk.
    pub async fn pull_from_cloud(
        &self,
        remote_path: &str,
        category: ArtifactCategory,
        file_name: Option<&str>,
        sync: Option<&RecordSync>,
    ) -> StorageResult<CloudDownloadResult> {
        let remote_path = normalize_remote_path(remote_path)?;
        let file_name = match file_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => normalize_artifact_file_name(name)?,
            None => normalize_artifact_file_name(remote_base_name(&remote_path))?,
        };
        let local_path = self
            .paths
            .build_path(category, StorageBackend::Backend, &file_name)?;

        self.cloud()?
            .download(&remote_path, Path::new(&local_path))
            .await?;

        let size = tokio::fs::metadata(&local_path)
            .await
            .map_err(|e| StorageError::io(format!("checking {}", local_path), e))?
            .len();

        let storage_servers = match sync {
            Some(target) => {
                let updated = self
                    .records
                    .update_locations(
                        target.kind,
                        target.id,
                        StorageAction::Add,
                        std::slice::from_ref(&target.local_label),
                    )
                    .await?;
                tracing::info!(
                    kind = %target.kind,
                    id = target.id,
                    local_path = %local_path,
                    storage_servers = ?updated,
                    "Record synced after cloud pull"
                );
                Some(updated)
            }
            None => None,
        };

        Ok(CloudDownloadResult {
            remote_path,
            local_path,
            file_name,
            category,
            size,
            storage_servers,
        })
    }
}

async fn is_regular_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}
