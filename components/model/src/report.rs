use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use minstant::Instant;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

use crate::error::ReportError;
use crate::offset::Offset;

/// Opaque server-instance identity. Replicas are equal-by-string only; the
/// lexical order is used solely as the final tie-break when arbitrating a
/// committer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(String);

impl ReplicaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ReplicaId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ReplicaId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Why a replica believes its segment has reached a stopping point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, StrumDisplay,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StopReason {
    RowLimit,
    SizeLimit,
    TimeLimit,
    ForcedStop,
    Exception,
}

impl StopReason {
    pub fn parse(value: &str) -> Result<Self, ReportError> {
        Self::from_str(value).map_err(|_| ReportError::UnknownStopReason(value.to_owned()))
    }
}

/// Latest word from one replica about one segment. A newer report from the
/// same replica replaces the old one wholesale; reports are never merged.
#[derive(Debug, Clone)]
pub struct ReplicaReport {
    pub replica_id: ReplicaId,

    pub offset: Offset,

    pub reason: StopReason,

    /// Arrival instant, used for the earliest-report tie-break.
    pub received: Instant,
}
