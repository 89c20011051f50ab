//! Artiroute Storage Library
//!
//! Routing and transfer of model weights and datasets between the local
//! backend disk, the cloud netdisk and remote hosts reached over SSH/SFTP.
//!
//! # Path layout
//!
//! Every (category, backend) pair has one configured root and an artifact
//! lives at `<root>/<file name>` on each backend:
//!
//! - **backend**: `BACKEND_WEIGHTS_ROOT/demo.pt`
//! - **cloud_netdisk**: `CLOUD_WEIGHTS_ROOT/demo.pt`
//! - **other_remote**: `OTHER_WEIGHTS_ROOT/demo.pt`
//!
//! Path derivation is centralized in the `paths` module so all backends agree.

pub mod directory;
pub mod download;
pub mod error;
pub mod locations;
pub mod netdisk;
pub mod paths;
pub mod records;
pub mod sftp;
pub mod upload;

// Re-export commonly used types
pub use artiroute_core::{ArtifactCategory, ArtifactKind, StorageAction, StorageBackend};
pub use directory::{CoreServer, ServerDirectory, StaticServerDirectory};
pub use download::{ArtifactDownloader, RecordSync};
pub use error::{StorageError, StorageResult};
pub use locations::{LocationSummary, LocationUpdate};
pub use netdisk::{CloudTransferClient, MountedNetdisk, NetdiskCredentials, NetdiskSdk};
pub use paths::ArtifactPathResolver;
pub use records::{ArtifactRecordStore, MemoryRecordStore};
pub use sftp::{RemoteSession, RemoteSessionFactory, ServerConfig, SftpTransferEngine};
pub use upload::{ArtifactUploader, UploadRequest, UploadSource};
