//! Core server directory: server key to (host, port).

use std::collections::BTreeMap;

use artiroute_core::CoreServerEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// A resolved directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreServer {
    pub key: String,
    pub ip: String,
    pub port: u32,
}

/// Lookup of remote servers by key.
#[async_trait]
pub trait ServerDirectory: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<CoreServer>;

    /// All entries, sorted by key.
    async fn list(&self) -> StorageResult<Vec<CoreServer>>;
}

/// Directory loaded once from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticServerDirectory {
    entries: BTreeMap<String, CoreServerEntry>,
}

impl StaticServerDirectory {
    pub fn new(entries: BTreeMap<String, CoreServerEntry>) -> Self {
        Self { entries }
    }

    fn to_server(key: &str, entry: &CoreServerEntry) -> CoreServer {
        CoreServer {
            key: key.to_string(),
            ip: entry.ip.trim().to_string(),
            port: entry.port,
        }
    }
}

#[async_trait]
impl ServerDirectory for StaticServerDirectory {
    async fn get(&self, key: &str) -> StorageResult<CoreServer> {
        let key = key.trim();
        if key.is_empty() {
            return Err(StorageError::InvalidServerConfig(
                "core server key is required".to_string(),
            ));
        }
        match self.entries.get(key) {
            Some(entry) if !entry.ip.trim().is_empty() => Ok(Self::to_server(key, entry)),
            Some(_) => Err(StorageError::InvalidServerConfig(format!(
                "core server {} has no ip",
                key
            ))),
            None => {
                tracing::warn!(core_server_key = %key, "Core server not found in directory");
                Err(StorageError::ServerNotFound(key.to_string()))
            }
        }
    }

    async fn list(&self) -> StorageResult<Vec<CoreServer>> {
        Ok(self
            .entries
            .iter()
            .map(|(key, entry)| Self::to_server(key, entry))
            .collect())
    }
}
