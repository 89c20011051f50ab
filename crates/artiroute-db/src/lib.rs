//! Postgres persistence for artifact records.

pub mod db;

pub use db::{setup_database, with_transaction, ArtifactRecord, ArtifactRecordRepository};
