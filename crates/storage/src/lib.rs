//! Storage Layer
//!
//! Alert evidence: JPEG snapshots on disk plus an in-memory alert log
//! with retention, combined behind the `EvidenceSink` capability.

mod evidence;
mod repository;
mod snapshot;

pub use evidence::EvidenceStore;
pub use repository::{AlertRecord, Repository, DEFAULT_MAX_ALERT_RECORDS};
pub use snapshot::{SnapshotStore, DEFAULT_JPEG_QUALITY};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Lock error: {0}")]
    Lock(String),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
