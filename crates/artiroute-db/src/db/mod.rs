//! Database repositories for the artifact metadata tables
//!
//! `models` and `datasets` share one shape; [`ArtifactRecordRepository`]
//! selects the table from the record's [`artiroute_core::ArtifactKind`].
//
// Artifact records (models, datasets)
pub mod artifacts;
//
// Pool setup and migrations
pub mod pool;
//
// Transaction utilities
pub mod transaction;

pub use artifacts::{ArtifactRecord, ArtifactRecordRepository};
pub use pool::setup_database;
pub use transaction::with_transaction;
