use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SegmentError;
use crate::offset::Offset;
use crate::partition::PartitionKey;

const SEGMENT_NAME_SEPARATOR: &str = "__";

/// Deterministic identifier of one segment of a partition group, in form of
/// `{table}__{partition-group}__{sequence}`.
///
/// Sequence numbers grow by exactly one per committed segment and are never
/// reused once a segment reaches [`SegmentStatus::Done`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SegmentName {
    table_name: String,

    partition_group_id: u32,

    sequence_number: u64,
}

impl SegmentName {
    pub fn new(table_name: impl Into<String>, partition_group_id: u32, sequence_number: u64) -> Self {
        Self {
            table_name: table_name.into(),
            partition_group_id,
            sequence_number,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn partition_group_id(&self) -> u32 {
        self.partition_group_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey::new(self.table_name.clone(), self.partition_group_id)
    }

    /// Name of the segment that follows this one in the partition.
    pub fn next(&self) -> SegmentName {
        Self {
            table_name: self.table_name.clone(),
            partition_group_id: self.partition_group_id,
            sequence_number: self.sequence_number + 1,
        }
    }
}

impl Display for SegmentName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.table_name,
            SEGMENT_NAME_SEPARATOR,
            self.partition_group_id,
            SEGMENT_NAME_SEPARATOR,
            self.sequence_number
        )
    }
}

impl FromStr for SegmentName {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Table names may themselves contain separators, so parse from the right.
        let mut parts = s.rsplitn(3, SEGMENT_NAME_SEPARATOR);
        let sequence = parts.next();
        let partition = parts.next();
        let table = parts.next();
        match (table, partition, sequence) {
            (Some(table), Some(partition), Some(sequence)) if !table.is_empty() => {
                let partition_group_id = partition
                    .parse::<u32>()
                    .map_err(|_| SegmentError::MalformedName(s.to_owned()))?;
                let sequence_number = sequence
                    .parse::<u64>()
                    .map_err(|_| SegmentError::MalformedName(s.to_owned()))?;
                Ok(Self::new(table, partition_group_id, sequence_number))
            }
            _ => Err(SegmentError::MalformedName(s.to_owned())),
        }
    }
}

impl TryFrom<String> for SegmentName {
    type Error = SegmentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SegmentName> for String {
    fn from(value: SegmentName) -> Self {
        value.to_string()
    }
}

/// Lifecycle of a persisted segment record.
///
/// Status only moves forward; the single backward edge is the supervisor
/// writing `RepairPending` over `Committing` when a committer goes silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentStatus {
    InProgress,
    Committing,
    Done,
    RepairPending,
}

/// Durable metadata of one segment, owned by the metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub segment_name: SegmentName,

    pub status: SegmentStatus,

    pub start_offset: Offset,

    /// Set when the segment reaches `Done`; equals the commit decision's
    /// target offset.
    pub end_offset: Option<Offset>,

    pub row_count: u64,

    pub size_bytes: u64,

    pub creation_time_ms: i64,

    pub flush_rows_threshold: u64,

    /// Retrievable reference to the uploaded artifact, recorded at
    /// commit-upload time.
    pub segment_location: Option<String>,
}

impl SegmentRecord {
    /// A fresh record for a segment that is about to start consuming.
    pub fn in_progress(
        segment_name: SegmentName,
        start_offset: Offset,
        flush_rows_threshold: u64,
        creation_time_ms: i64,
    ) -> Self {
        Self {
            segment_name,
            status: SegmentStatus::InProgress,
            start_offset,
            end_offset: None,
            row_count: 0,
            size_bytes: 0,
            creation_time_ms,
            flush_rows_threshold,
            segment_location: None,
        }
    }
}

impl Display for SegmentRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SegmentRecord[{}, status={:?}, start={}, end={:?}, rows={}, bytes={}]",
            self.segment_name,
            self.status,
            self.start_offset,
            self.end_offset,
            self.row_count,
            self.size_bytes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        let name = SegmentName::new("orders", 7, 42);
        assert_eq!("orders__7__42", name.to_string());
        let parsed: SegmentName = "orders__7__42".parse().unwrap();
        assert_eq!(name, parsed);
    }

    #[test]
    fn test_name_with_separator_in_table() {
        let parsed: SegmentName = "ad__events__0__5".parse().unwrap();
        assert_eq!("ad__events", parsed.table_name());
        assert_eq!(0, parsed.partition_group_id());
        assert_eq!(5, parsed.sequence_number());
    }

    #[test]
    fn test_malformed_names() {
        assert!("orders".parse::<SegmentName>().is_err());
        assert!("orders__x__1".parse::<SegmentName>().is_err());
        assert!("orders__1__x".parse::<SegmentName>().is_err());
        assert!("__1__2".parse::<SegmentName>().is_err());
    }

    #[test]
    fn test_next() {
        let name = SegmentName::new("orders", 7, 42);
        let next = name.next();
        assert_eq!(43, next.sequence_number());
        assert_eq!(name.partition_key(), next.partition_key());
    }

    #[test]
    fn test_in_progress_record() {
        let name = SegmentName::new("orders", 0, 0);
        let record = SegmentRecord::in_progress(name.clone(), Offset::ZERO, 100_000, 1_700_000_000_000);
        assert_eq!(SegmentStatus::InProgress, record.status);
        assert_eq!(None, record.end_offset);
        assert_eq!(100_000, record.flush_rows_threshold);
        assert_eq!(name, record.segment_name);
    }
}
