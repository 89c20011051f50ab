//! Storage and transfer errors.

use artiroute_core::{AppError, ArtifactKind};
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    // Validation
    #[error("invalid category: {0:?}")]
    InvalidCategory(String),

    #[error("invalid backend: {0}")]
    InvalidBackend(String),

    #[error("file name is empty or invalid: {0:?}")]
    EmptyFileName(String),

    #[error("invalid action: {0:?}, must be one of: set/add/remove")]
    InvalidAction(String),

    #[error("invalid location value: {0}")]
    InvalidLocationValue(String),

    #[error("invalid upload file: {0}")]
    InvalidUploadFile(String),

    #[error("invalid remote path: {0:?}")]
    InvalidRemotePath(String),

    #[error("{0} is required")]
    FilePathRequired(&'static str),

    #[error("invalid server config: {0}")]
    InvalidServerConfig(String),

    // State mismatch
    #[error("local file not found: {0}")]
    LocalFileNotFound(String),

    #[error("not a regular file: {0}")]
    NotRegularFile(String),

    #[error("remote artifact not found on {server}: {path}")]
    RemoteArtifactNotFound { server: String, path: String },

    #[error("remote artifact already exists on {server}: {path}")]
    RemoteArtifactAlreadyExists { server: String, path: String },

    #[error("artifact {file_name} exists in both backend weights and datasets roots")]
    ConflictInBackendRoots { file_name: String },

    #[error("artifact {file_name} exists in both remote weights and datasets roots on {server}")]
    ConflictInRemoteRoots { server: String, file_name: String },

    #[error("artifact {file_name} not found in backend weights or datasets roots")]
    NotFoundInBackendRoots { file_name: String },

    #[error("artifact {file_name} not found in remote weights or datasets roots on {server}")]
    NotFoundInRemoteRoots { server: String, file_name: String },

    #[error("artifact {file_name} is not available locally and has no cloud copy")]
    ArtifactUnavailable { file_name: String },

    #[error("{kind} record {id} not found")]
    RecordNotFound { kind: ArtifactKind, id: i64 },

    #[error("server not found: {0}")]
    ServerNotFound(String),

    // Environment / transport
    #[error("credential required: {0}")]
    CredentialRequired(String),

    #[error("ssh error on {server}: {message}")]
    Ssh { server: String, message: String },

    #[error("sftp {operation} failed on {server} for {path}: {message}")]
    Sftp {
        server: String,
        operation: &'static str,
        path: String,
        message: String,
    },

    #[error("netdisk {operation} failed: {message}")]
    Netdisk {
        operation: &'static str,
        message: String,
    },

    #[error("metadata store error: {0}")]
    Metadata(String),

    #[error("IO error while {context}: {source}")]
    IoError {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Attach context to an I/O failure.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::IoError {
            context: context.into(),
            source,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StorageError::InvalidCategory(_)
                | StorageError::InvalidBackend(_)
                | StorageError::EmptyFileName(_)
                | StorageError::InvalidAction(_)
                | StorageError::InvalidLocationValue(_)
                | StorageError::InvalidUploadFile(_)
                | StorageError::InvalidRemotePath(_)
                | StorageError::FilePathRequired(_)
                | StorageError::InvalidServerConfig(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::LocalFileNotFound(_)
                | StorageError::RemoteArtifactNotFound { .. }
                | StorageError::NotFoundInBackendRoots { .. }
                | StorageError::NotFoundInRemoteRoots { .. }
                | StorageError::ArtifactUnavailable { .. }
                | StorageError::RecordNotFound { .. }
                | StorageError::ServerNotFound(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::RemoteArtifactAlreadyExists { .. }
                | StorageError::ConflictInBackendRoots { .. }
                | StorageError::ConflictInRemoteRoots { .. }
        )
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err {
            e if e.is_validation() => AppError::BadRequest(message),
            StorageError::NotRegularFile(_) => AppError::BadRequest(message),
            e if e.is_not_found() => AppError::NotFound(message),
            e if e.is_conflict() => AppError::Conflict(message),
            StorageError::CredentialRequired(_) => AppError::CredentialRequired(message),
            StorageError::ConfigError(_) => AppError::Configuration(message),
            StorageError::Metadata(_) => AppError::Internal(message),
            _ => AppError::Transfer(message),
        }
    }
}
