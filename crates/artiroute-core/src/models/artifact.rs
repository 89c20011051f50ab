//! Artifact placement models: canonical paths and upload/download outcomes.

use serde::{Deserialize, Serialize};

use super::transfer::TransferResult;
use crate::storage_types::{ArtifactCategory, StorageBackend};

/// Canonical path of one artifact on every backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub backend: String,
    pub cloud_netdisk: String,
    pub other_remote: String,
}

impl ArtifactPaths {
    pub fn get(&self, backend: StorageBackend) -> &str {
        match backend {
            StorageBackend::Backend => &self.backend,
            StorageBackend::CloudNetdisk => &self.cloud_netdisk,
            StorageBackend::OtherRemote => &self.other_remote,
        }
    }
}

/// Outcome of saving an uploaded artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResult {
    pub stored_name: String,
    pub local_path: String,
    pub paths: ArtifactPaths,
    pub size: u64,
    /// Trimmed storage-server label, `backend` when none was given.
    pub storage_server: String,
    pub backend: StorageBackend,
    pub cloud_requested: bool,
    pub cloud_uploaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_remote_path: Option<String>,
    /// Core server the saved copy was pushed to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_server_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_transfer: Option<TransferResult>,
}

/// Outcome of pulling a cloud netdisk file into the local backend root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudDownloadResult {
    pub remote_path: String,
    pub local_path: String,
    pub file_name: String,
    pub category: ArtifactCategory,
    pub size: u64,
    /// Location Set of the synced record after the pull.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_servers: Option<Vec<String>>,
}
