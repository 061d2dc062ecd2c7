use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::offset::Offset;
use crate::report::{ReplicaId, StopReason};
use crate::segment::SegmentName;

/// Fields every completion request carries: which segment, which replica,
/// and where that replica currently stands in the partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportHeader {
    pub segment_name: SegmentName,

    pub replica_id: ReplicaId,

    pub offset: Offset,
}

impl Display for ReportHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "segment={}, replica={}, offset={}",
            self.segment_name, self.replica_id, self.offset
        )
    }
}

/// The replica hit its local flush condition and wants to know what to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumedRequest {
    #[serde(flatten)]
    pub header: ReportHeader,

    pub reason: StopReason,
}

/// The replica hit an unrecoverable local error and asks to be excused from
/// committer candidacy for this segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoppedConsumingRequest {
    #[serde(flatten)]
    pub header: ReportHeader,

    pub reason: String,
}

/// The chosen committer is about to build and upload the segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitStartRequest {
    #[serde(flatten)]
    pub header: ReportHeader,
}

/// The committer finished uploading the built artifact and hands back a
/// retrievable reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitUploadRequest {
    #[serde(flatten)]
    pub header: ReportHeader,

    pub segment_location: String,
}

/// The committer confirms the artifact is durable and reports final
/// statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitEndRequest {
    #[serde(flatten)]
    pub header: ReportHeader,

    pub row_count: u64,

    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> ReportHeader {
        ReportHeader {
            segment_name: SegmentName::new("orders", 2, 7),
            replica_id: ReplicaId::from("server-1"),
            offset: Offset::new(105),
        }
    }

    #[test]
    fn test_header_display() {
        assert_eq!(
            "segment=orders__2__7, replica=server-1, offset=105",
            format!("{}", header())
        );
    }

    #[test]
    fn test_consumed_serde_flattens_header() {
        let request = ConsumedRequest {
            header: header(),
            reason: StopReason::RowLimit,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!("orders__2__7", json["segment_name"]);
        assert_eq!("ROW_LIMIT", json["reason"]);
        assert_eq!(105, json["offset"]);
    }
}
