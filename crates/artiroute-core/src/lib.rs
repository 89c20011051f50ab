//! Artiroute Core Library
//!
//! This crate provides the domain types, error types and configuration shared by
//! every Artiroute component: artifact categories, storage backends, transfer and
//! upload result models, and the environment-driven configuration.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{
    default_private_key_path, parse_core_servers, ArtifactServiceConfig, Config, CoreServerEntry,
    NetdiskConfig, SshDefaults, StorageRoots,
};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::*;
pub use storage_types::{ArtifactCategory, ArtifactKind, StorageAction, StorageBackend};
// Note: StorageError and StorageResult live in the artiroute-storage crate.
