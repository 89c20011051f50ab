//! Configuration module
//!
//! This module provides the configuration for the artifact routing service:
//! the six canonical storage roots, cloud netdisk credentials, SSH defaults,
//! the static core-server directory and the optional metadata database.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use crate::storage_types::{ArtifactCategory, StorageBackend};

// Common constants
const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const SSH_DEFAULT_HOST: &str = "192.168.1.100";
const SSH_DEFAULT_PORT: u32 = 22;
const SSH_DEFAULT_USER: &str = "root";
const SSH_TIMEOUT_SECS: u64 = 15;
const NETDISK_LOG_PATH: &str = "logs/netdisk_sdk.log";

const DEFAULT_BACKEND_WEIGHTS_ROOT: &str = "data/weights";
const DEFAULT_BACKEND_DATASETS_ROOT: &str = "data/datasets";
const DEFAULT_REMOTE_WEIGHTS_ROOT: &str = "/project/artifacts/weights";
const DEFAULT_REMOTE_DATASETS_ROOT: &str = "/project/artifacts/datasets";

/// Private key file names tried under `~/.ssh`, in order.
const DEFAULT_KEY_NAMES: [&str; 2] = ["id_rsa", "id_ed25519"];

/// Canonical root directory for every (category, backend) pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageRoots {
    pub backend_weights: String,
    pub backend_datasets: String,
    pub cloud_weights: String,
    pub cloud_datasets: String,
    pub other_weights: String,
    pub other_datasets: String,
}

impl Default for StorageRoots {
    fn default() -> Self {
        Self {
            backend_weights: DEFAULT_BACKEND_WEIGHTS_ROOT.to_string(),
            backend_datasets: DEFAULT_BACKEND_DATASETS_ROOT.to_string(),
            cloud_weights: DEFAULT_REMOTE_WEIGHTS_ROOT.to_string(),
            cloud_datasets: DEFAULT_REMOTE_DATASETS_ROOT.to_string(),
            other_weights: DEFAULT_REMOTE_WEIGHTS_ROOT.to_string(),
            other_datasets: DEFAULT_REMOTE_DATASETS_ROOT.to_string(),
        }
    }
}

impl StorageRoots {
    /// Configured root for the pair, trimmed. May be empty if misconfigured.
    pub fn root(&self, category: ArtifactCategory, backend: StorageBackend) -> &str {
        let root = match (backend, category) {
            (StorageBackend::Backend, ArtifactCategory::Weights) => &self.backend_weights,
            (StorageBackend::Backend, ArtifactCategory::Datasets) => &self.backend_datasets,
            (StorageBackend::CloudNetdisk, ArtifactCategory::Weights) => &self.cloud_weights,
            (StorageBackend::CloudNetdisk, ArtifactCategory::Datasets) => &self.cloud_datasets,
            (StorageBackend::OtherRemote, ArtifactCategory::Weights) => &self.other_weights,
            (StorageBackend::OtherRemote, ArtifactCategory::Datasets) => &self.other_datasets,
        };
        root.trim()
    }
}

/// Cloud netdisk credentials and SDK settings.
#[derive(Clone, Debug, Default)]
pub struct NetdiskConfig {
    pub access_token: Option<String>,
    pub is_svip: bool,
    pub log_path: String,
    /// Directory where the netdisk is mounted locally, used by the mounted SDK.
    pub mount_root: Option<String>,
}

/// Identity used when a caller names a server that has no registered config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshDefaults {
    pub host: String,
    pub port: u32,
    pub user: String,
    pub private_key_path: String,
    pub timeout_secs: u64,
}

impl Default for SshDefaults {
    fn default() -> Self {
        Self {
            host: SSH_DEFAULT_HOST.to_string(),
            port: SSH_DEFAULT_PORT,
            user: SSH_DEFAULT_USER.to_string(),
            private_key_path: fallback_private_key_path(),
            timeout_secs: SSH_TIMEOUT_SECS,
        }
    }
}

/// Core server directory entry, `{"ip": "...", "port": 22}`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CoreServerEntry {
    pub ip: String,
    #[serde(default)]
    pub port: u32,
}

/// Artifact service configuration
#[derive(Clone, Debug)]
pub struct ArtifactServiceConfig {
    pub environment: String,
    pub roots: StorageRoots,
    pub netdisk: NetdiskConfig,
    pub ssh: SshDefaults,
    pub core_servers: BTreeMap<String, CoreServerEntry>,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<ArtifactServiceConfig>);

impl Config {
    fn inner(&self) -> &ArtifactServiceConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.inner().environment.to_lowercase();
        env == "production" || env == "prod"
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, anyhow::Error> {
        ArtifactServiceConfig::from_env().map(|c| Config(Box::new(c)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    pub fn environment(&self) -> &str {
        &self.inner().environment
    }

    pub fn roots(&self) -> &StorageRoots {
        &self.inner().roots
    }

    pub fn netdisk(&self) -> &NetdiskConfig {
        &self.inner().netdisk
    }

    pub fn ssh(&self) -> &SshDefaults {
        &self.inner().ssh
    }

    pub fn core_servers(&self) -> &BTreeMap<String, CoreServerEntry> {
        &self.inner().core_servers
    }

    pub fn database_url(&self) -> Option<&str> {
        self.inner().database_url.as_deref()
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().db_timeout_seconds
    }
}

impl ArtifactServiceConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let roots = StorageRoots {
            backend_weights: env::var("BACKEND_WEIGHTS_ROOT")
                .unwrap_or_else(|_| DEFAULT_BACKEND_WEIGHTS_ROOT.to_string()),
            backend_datasets: env::var("BACKEND_DATASETS_ROOT")
                .unwrap_or_else(|_| DEFAULT_BACKEND_DATASETS_ROOT.to_string()),
            cloud_weights: env::var("CLOUD_WEIGHTS_ROOT")
                .unwrap_or_else(|_| DEFAULT_REMOTE_WEIGHTS_ROOT.to_string()),
            cloud_datasets: env::var("CLOUD_DATASETS_ROOT")
                .unwrap_or_else(|_| DEFAULT_REMOTE_DATASETS_ROOT.to_string()),
            other_weights: env::var("OTHER_WEIGHTS_ROOT")
                .unwrap_or_else(|_| DEFAULT_REMOTE_WEIGHTS_ROOT.to_string()),
            other_datasets: env::var("OTHER_DATASETS_ROOT")
                .unwrap_or_else(|_| DEFAULT_REMOTE_DATASETS_ROOT.to_string()),
        };

        let netdisk = NetdiskConfig {
            access_token: env::var("NETDISK_ACCESS_TOKEN")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            is_svip: env::var("NETDISK_IS_SVIP")
                .unwrap_or_else(|_| "false".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(false),
            log_path: env::var("NETDISK_LOG_PATH").unwrap_or_else(|_| NETDISK_LOG_PATH.to_string()),
            mount_root: env::var("NETDISK_MOUNT_ROOT").ok().filter(|s| !s.trim().is_empty()),
        };

        let ssh = SshDefaults {
            host: env::var("SSH_DEFAULT_HOST").unwrap_or_else(|_| SSH_DEFAULT_HOST.to_string()),
            port: env::var("SSH_DEFAULT_PORT")
                .unwrap_or_else(|_| SSH_DEFAULT_PORT.to_string())
                .parse()
                .unwrap_or(SSH_DEFAULT_PORT),
            user: env::var("SSH_DEFAULT_USER").unwrap_or_else(|_| SSH_DEFAULT_USER.to_string()),
            private_key_path: env::var("SSH_PRIVATE_KEY_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(fallback_private_key_path),
            timeout_secs: env::var("SSH_TIMEOUT_SECS")
                .unwrap_or_else(|_| SSH_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(SSH_TIMEOUT_SECS),
        };

        let core_servers = match env::var("CORE_SERVERS") {
            Ok(raw) if !raw.trim().is_empty() => parse_core_servers(&raw)?,
            _ => BTreeMap::new(),
        };

        let config = ArtifactServiceConfig {
            environment,
            roots,
            netdisk,
            ssh,
            core_servers,
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty()),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        for category in ArtifactCategory::ALL {
            for backend in StorageBackend::ALL {
                if self.roots.root(category, backend).is_empty() {
                    return Err(anyhow::anyhow!(
                        "Storage root for {} on {} must not be empty",
                        category,
                        backend
                    ));
                }
            }
        }

        if self.ssh.port == 0 || self.ssh.port > 65535 {
            return Err(anyhow::anyhow!("SSH_DEFAULT_PORT must be between 1 and 65535"));
        }

        if self.ssh.host.trim().is_empty() || self.ssh.user.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "SSH_DEFAULT_HOST and SSH_DEFAULT_USER must not be empty"
            ));
        }

        for (key, entry) in &self.core_servers {
            if entry.ip.trim().is_empty() {
                return Err(anyhow::anyhow!("CORE_SERVERS entry '{}' has no ip", key));
            }
            if entry.port > 65535 {
                return Err(anyhow::anyhow!(
                    "CORE_SERVERS entry '{}' has invalid port {}",
                    key,
                    entry.port
                ));
            }
        }

        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        Ok(())
    }
}

/// Parse the `CORE_SERVERS` JSON object (`key -> {"ip", "port"}`).
pub fn parse_core_servers(raw: &str) -> Result<BTreeMap<String, CoreServerEntry>, anyhow::Error> {
    let parsed: BTreeMap<String, CoreServerEntry> = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("CORE_SERVERS must be a JSON object: {}", e))?;
    Ok(parsed
        .into_iter()
        .map(|(key, entry)| {
            (
                key.trim().to_string(),
                CoreServerEntry {
                    ip: entry.ip.trim().to_string(),
                    port: entry.port,
                },
            )
        })
        .collect())
}

/// First existing private key under `~/.ssh` (`id_rsa`, then `id_ed25519`).
pub fn default_private_key_path() -> Option<PathBuf> {
    let ssh_dir = dirs::home_dir()?.join(".ssh");
    DEFAULT_KEY_NAMES
        .iter()
        .map(|name| ssh_dir.join(name))
        .find(|path| path.is_file())
}

fn fallback_private_key_path() -> String {
    if let Some(found) = default_private_key_path() {
        return found.to_string_lossy().into_owned();
    }
    let guessed = dirs::home_dir()
        .map(|home| home.join(".ssh").join(DEFAULT_KEY_NAMES[0]).to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("~/.ssh/{}", DEFAULT_KEY_NAMES[0]));
    tracing::warn!(
        private_key_path = %guessed,
        "No SSH private key found, set SSH_PRIVATE_KEY_PATH"
    );
    guessed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ArtifactServiceConfig {
        ArtifactServiceConfig {
            environment: "development".to_string(),
            roots: StorageRoots::default(),
            netdisk: NetdiskConfig::default(),
            ssh: SshDefaults::default(),
            core_servers: BTreeMap::new(),
            database_url: None,
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
        }
    }

    #[test]
    fn root_lookup_is_trimmed() {
        let roots = StorageRoots {
            other_datasets: "  /srv/datasets  ".to_string(),
            ..StorageRoots::default()
        };
        assert_eq!(
            roots.root(ArtifactCategory::Datasets, StorageBackend::OtherRemote),
            "/srv/datasets"
        );
        assert_eq!(
            roots.root(ArtifactCategory::Weights, StorageBackend::Backend),
            DEFAULT_BACKEND_WEIGHTS_ROOT
        );
    }

    #[test]
    fn validate_rejects_empty_root() {
        let mut config = sample_config();
        config.roots.cloud_weights = "   ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_postgres_url() {
        let mut config = sample_config();
        config.database_url = Some("mysql://localhost/db".to_string());
        assert!(config.validate().is_err());

        config.database_url = Some("postgres://localhost/artifacts".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_core_servers_trims_entries() {
        let servers =
            parse_core_servers(r#"{" gpu-01 ": {"ip": " 10.0.0.5 ", "port": 2222}, "gpu-02": {"ip": "10.0.0.6"}}"#)
                .unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(
            servers.get("gpu-01"),
            Some(&CoreServerEntry {
                ip: "10.0.0.5".to_string(),
                port: 2222
            })
        );
        assert_eq!(servers.get("gpu-02").map(|e| e.port), Some(0));
    }

    #[test]
    fn parse_core_servers_rejects_non_object() {
        assert!(parse_core_servers("[1, 2]").is_err());
    }

    #[test]
    fn production_detection() {
        let mut config = sample_config();
        config.environment = "Prod".to_string();
        assert!(Config(Box::new(config)).is_production());
    }
}
