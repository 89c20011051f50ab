//! Wiring shared by the `artiroute` binary.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use artiroute_core::{Config, NetdiskConfig};
use artiroute_db::{setup_database, ArtifactRecordRepository};
use artiroute_storage::{
    ArtifactDownloader, ArtifactPathResolver, ArtifactRecordStore, ArtifactUploader,
    CloudTransferClient, CoreServer, MountedNetdisk, ServerConfig, ServerDirectory,
    SftpTransferEngine, StaticServerDirectory, StorageResult,
};
use serde::Serialize;

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Cloud client over the mounted netdisk, when a mount root is configured.
pub fn cloud_client(config: &NetdiskConfig) -> Option<Arc<CloudTransferClient>> {
    let mount_root = config
        .mount_root
        .as_deref()
        .map(str::trim)
        .filter(|root| !root.is_empty())?;
    let sdk = Arc::new(MountedNetdisk::new(Path::new(mount_root)));
    Some(Arc::new(CloudTransferClient::from_config(config, sdk)))
}

/// Everything a command needs, built once from configuration.
pub struct Services {
    pub config: Config,
    pub paths: ArtifactPathResolver,
    pub cloud: Option<Arc<CloudTransferClient>>,
    pub engine: Arc<SftpTransferEngine>,
    pub directory: Arc<StaticServerDirectory>,
}

impl Services {
    pub fn from_config(config: Config) -> Self {
        let paths = ArtifactPathResolver::new(config.roots().clone());
        let cloud = cloud_client(config.netdisk());
        if cloud.is_none() {
            tracing::debug!("NETDISK_MOUNT_ROOT not set, cloud transfers disabled");
        }
        let engine = Arc::new(SftpTransferEngine::with_ssh2(paths.clone(), config.ssh()));
        let directory = Arc::new(StaticServerDirectory::new(config.core_servers().clone()));
        Self {
            config,
            paths,
            cloud,
            engine,
            directory,
        }
    }

    /// Uploader with cloud and core-server pushes wired in.
    pub fn uploader(&self) -> ArtifactUploader {
        ArtifactUploader::new(self.paths.clone(), self.cloud.clone())
            .with_core_push(self.engine.clone(), self.directory.clone())
    }

    /// Postgres-backed record repository. Requires `DATABASE_URL`.
    pub async fn records(&self) -> anyhow::Result<Arc<ArtifactRecordRepository>> {
        let pool = setup_database(&self.config)
            .await
            .context("Record store unavailable")?;
        Ok(Arc::new(ArtifactRecordRepository::new(pool)))
    }

    pub fn downloader(&self, records: Arc<dyn ArtifactRecordStore>) -> ArtifactDownloader {
        ArtifactDownloader::new(self.paths.clone(), self.cloud.clone(), records)
    }
}

/// Output of `artiroute servers`: what a fresh process can reach.
#[derive(Debug, Serialize)]
pub struct ServerSummary {
    /// Identity used for server names without a directory entry.
    pub default: ServerConfig,
    pub core_servers: Vec<CoreServer>,
}

pub async fn server_summary(
    engine: &SftpTransferEngine,
    directory: &dyn ServerDirectory,
) -> StorageResult<ServerSummary> {
    Ok(ServerSummary {
        default: engine.servers().default_server().clone(),
        core_servers: directory.list().await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use artiroute_core::{CoreServerEntry, SshDefaults, StorageRoots};

    #[tokio::test]
    async fn server_summary_lists_default_and_directory() {
        let defaults = SshDefaults {
            host: "192.168.1.100".to_string(),
            ..SshDefaults::default()
        };
        let engine = SftpTransferEngine::with_ssh2(
            ArtifactPathResolver::new(StorageRoots::default()),
            &defaults,
        );
        let mut entries = BTreeMap::new();
        entries.insert(
            "rtx3090".to_string(),
            CoreServerEntry {
                ip: "10.0.0.7".to_string(),
                port: 22,
            },
        );
        let directory = StaticServerDirectory::new(entries);

        let summary = server_summary(&engine, &directory).await.unwrap();
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["default"]["host"], "192.168.1.100");
        assert_eq!(value["core_servers"][0]["key"], "rtx3090");
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn cloud_client_requires_mount_root() {
        let mut config = NetdiskConfig {
            access_token: Some("token".to_string()),
            is_svip: false,
            log_path: "logs/netdisk_sdk.log".to_string(),
            mount_root: None,
        };
        assert!(cloud_client(&config).is_none());

        config.mount_root = Some("  ".to_string());
        assert!(cloud_client(&config).is_none());

        let dir = tempfile::tempdir().unwrap();
        config.mount_root = Some(dir.path().display().to_string());
        assert!(cloud_client(&config).is_some());
    }
}
