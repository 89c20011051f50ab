//! Data models for the application
//!
//! Result types returned by the storage routing and transfer operations.
//! None of these are persisted; they are serialized for callers only.

mod artifact;
mod transfer;

pub use artifact::*;
pub use transfer::*;
