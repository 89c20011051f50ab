use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Labels that identify the cloud netdisk backend, compared after trimming and lowercasing.
pub const CLOUD_NETDISK_LABELS: &[&str] = &[
    "cloud_netdisk",
    "cloud",
    "netdisk",
    "baidu_netdisk",
    "baidu",
    "baidu-pan",
    "baidu_pan",
    "baidupan",
    "pan.baidu",
    "百度网盘",
];

/// Artifact categories
///
/// A category selects which pair of canonical roots applies to an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactCategory {
    Weights,
    Datasets,
}

impl ArtifactCategory {
    pub const ALL: [ArtifactCategory; 2] = [ArtifactCategory::Weights, ArtifactCategory::Datasets];

    /// Parse a free-text category, accepting synonyms. Blank input selects weights.
    pub fn from_label(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "" | "weight" | "weights" | "model" | "models" => Some(ArtifactCategory::Weights),
            "dataset" | "datasets" => Some(ArtifactCategory::Datasets),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactCategory::Weights => "weights",
            ArtifactCategory::Datasets => "datasets",
        }
    }
}

impl FromStr for ArtifactCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| anyhow::anyhow!("Invalid artifact category: {}", s))
    }
}

impl Display for ArtifactCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Storage backend types
///
/// Each (category, backend) pair maps to exactly one configured root directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Local disk of the machine running the service
    Backend,
    CloudNetdisk,
    /// Arbitrary host reached over SSH/SFTP
    OtherRemote,
}

impl StorageBackend {
    pub const ALL: [StorageBackend; 3] = [
        StorageBackend::Backend,
        StorageBackend::CloudNetdisk,
        StorageBackend::OtherRemote,
    ];

    /// Parse a free-text backend, accepting synonyms. Blank input selects the local backend.
    pub fn from_label(input: &str) -> Option<Self> {
        let value = input.trim().to_lowercase();
        if Self::is_cloud_label(&value) {
            return Some(StorageBackend::CloudNetdisk);
        }
        match value.as_str() {
            "" | "backend" | "local" => Some(StorageBackend::Backend),
            "other_remote" | "other_local" | "other" | "remote" => Some(StorageBackend::OtherRemote),
            _ => None,
        }
    }

    /// Whether a free-text label (storage server name, location entry) names the cloud netdisk.
    pub fn is_cloud_label(label: &str) -> bool {
        let value = label.trim().to_lowercase();
        CLOUD_NETDISK_LABELS.contains(&value.as_str())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Backend => "backend",
            StorageBackend::CloudNetdisk => "cloud_netdisk",
            StorageBackend::OtherRemote => "other_remote",
        }
    }
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| anyhow::anyhow!("Invalid storage backend: {}", s))
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of metadata record that owns an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Model,
    Dataset,
}

impl ArtifactKind {
    /// Models own weights, datasets own dataset archives.
    pub fn category(&self) -> ArtifactCategory {
        match self {
            ArtifactKind::Model => ArtifactCategory::Weights,
            ArtifactKind::Dataset => ArtifactCategory::Datasets,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Model => "model",
            ArtifactKind::Dataset => "dataset",
        }
    }
}

impl FromStr for ArtifactKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "model" | "models" => Ok(ArtifactKind::Model),
            "dataset" | "datasets" => Ok(ArtifactKind::Dataset),
            _ => Err(anyhow::anyhow!("Invalid artifact kind: {}", s)),
        }
    }
}

impl Display for ArtifactKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Mutation applied to a location set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageAction {
    Set,
    Add,
    Remove,
}

impl StorageAction {
    /// Parse an action; blank input means `set`.
    pub fn from_label(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "" | "set" => Some(StorageAction::Set),
            "add" => Some(StorageAction::Add),
            "remove" => Some(StorageAction::Remove),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageAction::Set => "set",
            StorageAction::Add => "add",
            StorageAction::Remove => "remove",
        }
    }
}

impl FromStr for StorageAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| {
            anyhow::anyhow!("Invalid action: {}, must be one of: set/add/remove", s)
        })
    }
}

impl Display for StorageAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_synonyms() {
        assert_eq!(ArtifactCategory::from_label(""), Some(ArtifactCategory::Weights));
        assert_eq!(ArtifactCategory::from_label(" Models "), Some(ArtifactCategory::Weights));
        assert_eq!(ArtifactCategory::from_label("DATASET"), Some(ArtifactCategory::Datasets));
        assert_eq!(ArtifactCategory::from_label("images"), None);
    }

    #[test]
    fn backend_synonyms() {
        assert_eq!(StorageBackend::from_label(""), Some(StorageBackend::Backend));
        assert_eq!(StorageBackend::from_label("Baidu_Pan"), Some(StorageBackend::CloudNetdisk));
        assert_eq!(StorageBackend::from_label("百度网盘"), Some(StorageBackend::CloudNetdisk));
        assert_eq!(StorageBackend::from_label("other_local"), Some(StorageBackend::OtherRemote));
        assert_eq!(StorageBackend::from_label("s3"), None);
    }

    #[test]
    fn backend_serde_uses_canonical_identifiers() {
        let json = serde_json::to_string(&StorageBackend::CloudNetdisk).unwrap();
        assert_eq!(json, "\"cloud_netdisk\"");
        assert_eq!(StorageBackend::OtherRemote.to_string(), "other_remote");
    }

    #[test]
    fn action_parsing() {
        assert_eq!(StorageAction::from_label(""), Some(StorageAction::Set));
        assert_eq!(StorageAction::from_label(" ADD "), Some(StorageAction::Add));
        assert!("bogus".parse::<StorageAction>().is_err());
    }

    #[test]
    fn kind_maps_to_category() {
        assert_eq!(ArtifactKind::Model.category(), ArtifactCategory::Weights);
        assert_eq!(ArtifactKind::Dataset.category(), ArtifactCategory::Datasets);
    }
}
