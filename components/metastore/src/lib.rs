use async_trait::async_trait;
use model::{SegmentName, SegmentRecord};
use thiserror::Error;

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

pub mod memory;

pub use crate::memory::MemorySegmentStore;

/// Monotonic record version used for optimistic concurrency.
pub type Version = i64;

#[derive(Debug, Error, PartialEq)]
pub enum MetaError {
    #[error("Record version conflict, expected {expected}, actual {actual}")]
    Conflict { expected: Version, actual: Version },

    #[error("Record `{0}` already exists")]
    AlreadyExists(String),

    #[error("Record `{0}` is not found")]
    NotFound(String),

    #[error("Metadata store error: `{0}`")]
    Internal(String),
}

/// Durable home of [`SegmentRecord`]s.
///
/// The coordinator never writes blindly: updates carry the version it last
/// read and fail with [`MetaError::Conflict`] if the record moved underneath
/// it, and a record for the next segment is only created once the current
/// one reaches `Done`.
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait SegmentStore: Send + Sync + 'static {
    /// Read a record together with the version to compare against on the
    /// next write. `None` if the segment has never been recorded.
    async fn read_segment_record(
        &self,
        name: &SegmentName,
    ) -> Result<Option<(SegmentRecord, Version)>, MetaError>;

    /// Compare-and-set update of an existing record.
    async fn write_segment_record(
        &self,
        name: &SegmentName,
        record: SegmentRecord,
        expected: Version,
    ) -> Result<Version, MetaError>;

    /// Create a record that must not exist yet.
    async fn create_segment_record(
        &self,
        name: &SegmentName,
        record: SegmentRecord,
    ) -> Result<Version, MetaError>;
}
