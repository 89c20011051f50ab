//! Remote server identities and the name -> config registry.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use artiroute_core::SshDefaults;
use serde::Serialize;

use crate::error::{StorageError, StorageResult};

pub const DEFAULT_SSH_PORT: u32 = 22;
pub const DEFAULT_SSH_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection settings for one SSH server.
///
/// `port` 0 and a zero `timeout` mean "use the default" until [`ServerConfig::normalized`] runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    pub name: String,
    pub host: String,
    pub port: u32,
    pub user: String,
    pub private_key_path: String,
    #[serde(rename = "timeout_secs", serialize_with = "serialize_secs")]
    pub timeout: Duration,
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

impl ServerConfig {
    pub fn new(host: &str, port: u32, user: &str, private_key_path: &str) -> Self {
        Self {
            name: String::new(),
            host: host.to_string(),
            port,
            user: user.to_string(),
            private_key_path: private_key_path.to_string(),
            timeout: Duration::ZERO,
        }
    }

    /// Default identity built from configuration.
    pub fn from_defaults(defaults: &SshDefaults) -> Self {
        Self {
            name: "default".to_string(),
            host: defaults.host.clone(),
            port: defaults.port,
            user: defaults.user.clone(),
            private_key_path: defaults.private_key_path.clone(),
            timeout: Duration::from_secs(defaults.timeout_secs),
        }
    }

    /// Trim fields, fill defaults and validate.
    pub fn normalized(&self) -> StorageResult<Self> {
        let mut cfg = self.clone();
        cfg.host = cfg.host.trim().to_string();
        cfg.user = cfg.user.trim().to_string();
        cfg.private_key_path = cfg.private_key_path.trim().to_string();
        if cfg.port == 0 {
            cfg.port = DEFAULT_SSH_PORT;
        }
        validate_port(cfg.port)?;
        if cfg.timeout.is_zero() {
            cfg.timeout = DEFAULT_SSH_TIMEOUT;
        }
        if cfg.host.is_empty() {
            return Err(StorageError::InvalidServerConfig("server ip is required".to_string()));
        }
        if cfg.user.is_empty() {
            return Err(StorageError::InvalidServerConfig("ssh user is required".to_string()));
        }
        if cfg.private_key_path.is_empty() {
            return Err(StorageError::InvalidServerConfig(
                "ssh private key path is required".to_string(),
            ));
        }
        Ok(cfg)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn validate_port(port: u32) -> StorageResult<()> {
    if port == 0 || port > 65535 {
        return Err(StorageError::InvalidServerConfig(format!(
            "ssh server port {} is invalid",
            port
        )));
    }
    Ok(())
}

fn require_name(name: &str) -> StorageResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StorageError::InvalidServerConfig("server name is required".to_string()));
    }
    Ok(name)
}

/// Registered servers plus the fallback identity for unknown names.
pub struct ServerRegistry {
    servers: RwLock<HashMap<String, ServerConfig>>,
    default_server: ServerConfig,
}

impl ServerRegistry {
    pub fn new(default_server: ServerConfig) -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            default_server,
        }
    }

    /// Identity used for names that were never registered.
    pub fn default_server(&self) -> &ServerConfig {
        &self.default_server
    }

    /// Register or replace a server under `name`.
    pub fn set(&self, name: &str, cfg: ServerConfig) -> StorageResult<ServerConfig> {
        let name = require_name(name)?;
        let mut normalized = cfg.normalized().inspect_err(|e| {
            tracing::error!(server_name = %name, error = %e, "Rejected server config");
        })?;
        normalized.name = name.to_string();

        let mut servers = self
            .servers
            .write()
            .map_err(|_| StorageError::ConfigError("server registry lock poisoned".to_string()))?;
        servers.insert(name.to_string(), normalized.clone());

        tracing::info!(
            server_name = %name,
            server_ip = %normalized.host,
            port = normalized.port,
            user = %normalized.user,
            private_key_path = %normalized.private_key_path,
            "Server config registered"
        );
        Ok(normalized)
    }

    /// Resolve `name`, falling back to the default identity. `port_override` > 0 wins.
    pub fn resolve(&self, name: &str, port_override: u32) -> StorageResult<ServerConfig> {
        let name = require_name(name)?;

        let registered = self
            .servers
            .read()
            .map_err(|_| StorageError::ConfigError("server registry lock poisoned".to_string()))?
            .get(name)
            .cloned();

        let (base, from_registry) = match registered {
            Some(cfg) => (cfg, true),
            None => (self.default_server.clone(), false),
        };

        let mut resolved = base.normalized()?;
        resolved.name = name.to_string();
        if port_override > 0 {
            resolved.port = port_override;
        }
        validate_port(resolved.port)?;

        if from_registry {
            tracing::debug!(server_name = %name, server_ip = %resolved.host, port = resolved.port, "Resolved registered server");
        } else {
            tracing::warn!(
                server_name = %name,
                server_ip = %resolved.host,
                port = resolved.port,
                "Server not registered, using default server identity"
            );
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_server() -> ServerConfig {
        let mut cfg = ServerConfig::new("192.168.1.100", 22, "root", "/root/.ssh/id_rsa");
        cfg.name = "default".to_string();
        cfg
    }

    #[test]
    fn normalize_fills_defaults() {
        let cfg = ServerConfig::new(" 10.0.0.5 ", 0, " ubuntu ", " /k ").normalized().unwrap();
        assert_eq!(cfg.host, "10.0.0.5");
        assert_eq!(cfg.port, 22);
        assert_eq!(cfg.user, "ubuntu");
        assert_eq!(cfg.private_key_path, "/k");
        assert_eq!(cfg.timeout, DEFAULT_SSH_TIMEOUT);
    }

    #[test]
    fn normalize_rejects_missing_fields_and_bad_port() {
        for cfg in [
            ServerConfig::new("", 22, "root", "/k"),
            ServerConfig::new("h", 22, " ", "/k"),
            ServerConfig::new("h", 22, "root", ""),
            ServerConfig::new("h", 70000, "root", "/k"),
        ] {
            assert!(matches!(
                cfg.normalized(),
                Err(StorageError::InvalidServerConfig(_))
            ));
        }
    }

    #[test]
    fn set_requires_name() {
        let registry = ServerRegistry::new(default_server());
        let result = registry.set("  ", ServerConfig::new("h", 22, "root", "/k"));
        assert!(matches!(result, Err(StorageError::InvalidServerConfig(_))));
    }

    #[test]
    fn resolve_prefers_registered_config() {
        let registry = ServerRegistry::new(default_server());
        registry
            .set("gpu-01", ServerConfig::new("10.0.0.5", 2222, "ubuntu", "/k"))
            .unwrap();

        let cfg = registry.resolve(" gpu-01 ", 0).unwrap();
        assert_eq!(cfg.name, "gpu-01");
        assert_eq!(cfg.host, "10.0.0.5");
        assert_eq!(cfg.port, 2222);
    }

    #[test]
    fn resolve_falls_back_to_default_with_caller_name() {
        let registry = ServerRegistry::new(default_server());
        let cfg = registry.resolve("unknown", 0).unwrap();
        assert_eq!(cfg.name, "unknown");
        assert_eq!(cfg.host, "192.168.1.100");
        assert_eq!(cfg.port, 22);
    }

    #[test]
    fn resolve_applies_port_override() {
        let registry = ServerRegistry::new(default_server());
        assert_eq!(registry.resolve("x", 2200).unwrap().port, 2200);
        assert!(matches!(
            registry.resolve("x", 65536),
            Err(StorageError::InvalidServerConfig(_))
        ));
        assert!(matches!(
            registry.resolve("", 0),
            Err(StorageError::InvalidServerConfig(_))
        ));
    }
}
