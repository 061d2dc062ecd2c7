use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use config::{Flush, FlushPolicyKind};
use parking_lot::Mutex;

pub(crate) mod size_based;

pub use self::size_based::SizeBasedPolicy;

/// Statistics of the segment that just finished committing, fed back into
/// the sizing loop.
#[derive(Debug, Clone)]
pub struct CommittingSegment {
    pub row_count: u64,

    /// Final on-disk size. Zero means the size is unknown, which happens on
    /// the first commit after a repair.
    pub size_bytes: u64,

    /// The rows threshold the committing segment was consuming under.
    pub rows_threshold: u64,

    pub consumption_time: Duration,
}

/// Closed set of sizing strategies, chosen per table from configuration.
#[derive(Debug)]
pub enum FlushThresholdPolicy {
    SizeBased(SizeBasedPolicy),
    FixedRows(FixedRowsPolicy),
    TimeBased(TimeBasedPolicy),
}

impl FlushThresholdPolicy {
    pub fn from_config(flush: &Flush) -> Self {
        match flush.policy {
            FlushPolicyKind::SizeBased => {
                FlushThresholdPolicy::SizeBased(SizeBasedPolicy::new(flush))
            }
            FlushPolicyKind::FixedRows => FlushThresholdPolicy::FixedRows(FixedRowsPolicy {
                rows: flush.initial_rows_threshold,
            }),
            FlushPolicyKind::TimeBased => FlushThresholdPolicy::TimeBased(TimeBasedPolicy {
                flush_interval: flush.time_flush_interval(),
                initial_rows_threshold: flush.initial_rows_threshold,
            }),
        }
    }

    /// Row target for the partition's next segment. `None` means no
    /// committing-segment statistics are available (brand-new partition, or
    /// the first segment after the coordinator lost its in-memory history).
    pub fn rows_threshold(&self, committing: Option<&CommittingSegment>) -> u64 {
        match self {
            FlushThresholdPolicy::SizeBased(policy) => policy.rows_threshold(committing),
            FlushThresholdPolicy::FixedRows(policy) => policy.rows_threshold(),
            FlushThresholdPolicy::TimeBased(policy) => policy.rows_threshold(committing),
        }
    }
}

/// Always the configured row count; for tables whose record size is stable
/// enough that adaptation buys nothing.
#[derive(Debug)]
pub struct FixedRowsPolicy {
    rows: u64,
}

impl FixedRowsPolicy {
    fn rows_threshold(&self) -> u64 {
        self.rows.max(1)
    }
}

/// Targets a fixed consumption duration per segment by scaling the observed
/// ingestion rate to the configured interval.
#[derive(Debug)]
pub struct TimeBasedPolicy {
    flush_interval: Duration,

    initial_rows_threshold: u64,
}

impl TimeBasedPolicy {
    fn rows_threshold(&self, committing: Option<&CommittingSegment>) -> u64 {
        let Some(segment) = committing else {
            return self.initial_rows_threshold.max(1);
        };
        let elapsed = segment.consumption_time.as_secs_f64();
        if segment.row_count == 0 || elapsed <= 0.0 {
            return segment.rows_threshold.max(1);
        }
        let rate = segment.row_count as f64 / elapsed;
        size_based::cap_rows(rate * self.flush_interval.as_secs_f64())
    }
}

/// Process-wide map of table name to that table's policy instance. The
/// instance owns the table's ratio history, so it must be shared by every
/// partition of the table.
#[derive(Debug)]
pub struct FlushThresholds {
    flush: Flush,

    policies: Mutex<HashMap<String, Arc<FlushThresholdPolicy>>>,
}

impl FlushThresholds {
    pub fn new(flush: Flush) -> Self {
        Self {
            flush,
            policies: Mutex::new(HashMap::new()),
        }
    }

    pub fn for_table(&self, table_name: &str) -> Arc<FlushThresholdPolicy> {
        let mut policies = self.policies.lock();
        policies
            .entry(table_name.to_owned())
            .or_insert_with(|| Arc::new(FlushThresholdPolicy::from_config(&self.flush)))
            .clone()
    }
}
