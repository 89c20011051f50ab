//! SSH/SFTP transfer models.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage_types::ArtifactCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferDirection::Upload => write!(f, "upload"),
            TransferDirection::Download => write!(f, "download"),
        }
    }
}

/// One completed file transfer between the local host and a remote server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub server_name: String,
    pub server_ip: String,
    pub direction: TransferDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ArtifactCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub source_path: String,
    pub target_path: String,
    pub bytes: u64,
    #[serde(rename = "cost_ms")]
    pub duration_ms: u64,
}

impl TransferResult {
    /// Attach the artifact identity resolved by a by-name operation.
    pub fn with_artifact(mut self, category: ArtifactCategory, file_name: &str) -> Self {
        self.category = Some(category);
        self.file_name = Some(file_name.to_string());
        self
    }
}

/// Existence of one file name under both remote roots of a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSearchResult {
    pub server_name: String,
    pub server_ip: String,
    pub file_name: String,
    pub weights_path: String,
    pub datasets_path: String,
    pub exists_in_weights: bool,
    pub exists_in_datasets: bool,
    pub any_exists: bool,
    /// Set only when exactly one of the two roots holds the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_remote_path: Option<String>,
}

impl RemoteSearchResult {
    /// Category of the unambiguous match, if any.
    pub fn matched_category(&self) -> Option<ArtifactCategory> {
        match (self.exists_in_weights, self.exists_in_datasets) {
            (true, false) => Some(ArtifactCategory::Weights),
            (false, true) => Some(ArtifactCategory::Datasets),
            _ => None,
        }
    }

    pub fn exists_in(&self, category: ArtifactCategory) -> bool {
        match category {
            ArtifactCategory::Weights => self.exists_in_weights,
            ArtifactCategory::Datasets => self.exists_in_datasets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_result_serializes_cost_ms() {
        let result = TransferResult {
            server_name: "gpu-01".to_string(),
            server_ip: "10.0.0.5".to_string(),
            direction: TransferDirection::Upload,
            category: None,
            file_name: None,
            source_path: "/data/weights/demo.pt".to_string(),
            target_path: "/project/weights/demo.pt".to_string(),
            bytes: 12,
            duration_ms: 40,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["direction"], "upload");
        assert_eq!(value["cost_ms"], 40);
        assert!(value.get("category").is_none());
    }

    #[test]
    fn matched_category_requires_single_hit() {
        let mut result = RemoteSearchResult {
            server_name: "gpu-01".to_string(),
            server_ip: "10.0.0.5".to_string(),
            file_name: "demo.pt".to_string(),
            weights_path: "/w/demo.pt".to_string(),
            datasets_path: "/d/demo.pt".to_string(),
            exists_in_weights: true,
            exists_in_datasets: false,
            any_exists: true,
            matched_remote_path: Some("/w/demo.pt".to_string()),
        };
        assert_eq!(result.matched_category(), Some(ArtifactCategory::Weights));

        result.exists_in_datasets = true;
        assert_eq!(result.matched_category(), None);
    }
}
