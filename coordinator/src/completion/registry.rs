use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use config::Configuration;
use log::{error, info, warn};
use metastore::{MetaError, SegmentStore};
use minstant::Instant;
use model::request::{
    CommitEndRequest, CommitStartRequest, CommitUploadRequest, ConsumedRequest, ReportHeader,
    StoppedConsumingRequest,
};
use model::{
    CompletionResponse, Offset, PartitionKey, SegmentName, SegmentRecord, SegmentStatus,
};
use observation::metrics::{
    COUNTER_COMMIT_CONFLICTS, COUNTER_SEGMENTS_ABORTED, COUNTER_SEGMENTS_COMMITTED,
    COUNTER_STRAGGLER_REPAIRS, GAUGE_LIVE_STATE_MACHINES,
};
use parking_lot::Mutex;

use super::fsm::{
    CommitEndAction, CommitFinalization, CommitStartAction, RepairAction, SegmentCommitFsm,
};
use crate::flush::{CommittingSegment, FlushThresholds};

/// One live arbitration, addressable by partition; requests serialize on the
/// inner mutex only, so unrelated partitions proceed fully in parallel.
pub(crate) struct CommitMachine {
    pub(crate) key: PartitionKey,

    pub(crate) segment_name: SegmentName,

    pub(crate) fsm: Mutex<SegmentCommitFsm>,
}

enum Lookup {
    Machine(Arc<CommitMachine>),
    Respond(CompletionResponse),
}

/// Leadership-scoped map of partition to its active commit state machine.
///
/// Machines are seeded lazily by the first replica report for a partition
/// and retired once their segment reaches `Done` or is abandoned. Metadata
/// store calls always happen with no machine lock held; when a durable write
/// fails after a local transition, the machine is rolled back so memory and
/// store never diverge.
pub struct CompletionRegistry<S> {
    config: Arc<Configuration>,

    store: Arc<S>,

    flush: Arc<FlushThresholds>,

    machines: Mutex<HashMap<PartitionKey, Arc<CommitMachine>>>,
}

impl<S> CompletionRegistry<S>
where
    S: SegmentStore,
{
    pub fn new(config: Arc<Configuration>, store: Arc<S>, flush: Arc<FlushThresholds>) -> Self {
        Self {
            config,
            store,
            flush,
            machines: Mutex::new(HashMap::new()),
        }
    }

    pub async fn segment_consumed(&self, request: &ConsumedRequest) -> CompletionResponse {
        match self.machine_for(&request.header, true).await {
            Lookup::Respond(response) => response,
            Lookup::Machine(machine) => {
                machine
                    .fsm
                    .lock()
                    .on_consumed(&request.header, request.reason, Instant::now())
            }
        }
    }

    pub async fn segment_stopped_consuming(
        &self,
        request: &StoppedConsumingRequest,
    ) -> CompletionResponse {
        match self.machine_for(&request.header, true).await {
            Lookup::Respond(response) => response,
            Lookup::Machine(machine) => machine.fsm.lock().on_stopped_consuming(
                &request.header,
                &request.reason,
                Instant::now(),
            ),
        }
    }

    pub async fn segment_commit_start(&self, request: &CommitStartRequest) -> CompletionResponse {
        let machine = match self.machine_for(&request.header, false).await {
            Lookup::Respond(response) => return response,
            Lookup::Machine(machine) => machine,
        };
        let action = machine
            .fsm
            .lock()
            .on_commit_start(&request.header, Instant::now());
        match action {
            CommitStartAction::Respond(response) => response,
            CommitStartAction::Persist {
                target_offset,
                build_time_ms,
            } => match self.persist_committing(&machine.segment_name).await {
                Ok(()) => CompletionResponse::Commit {
                    offset: target_offset,
                    build_time_ms,
                },
                Err(e) => {
                    warn!(
                        "Failed to persist COMMITTING for {}: {}",
                        machine.segment_name, e
                    );
                    COUNTER_COMMIT_CONFLICTS.inc();
                    machine.fsm.lock().rollback_commit_start(Instant::now());
                    CompletionResponse::Hold
                }
            },
        }
    }

    pub async fn segment_commit_upload(&self, request: &CommitUploadRequest) -> CompletionResponse {
        match self.machine_for(&request.header, false).await {
            Lookup::Respond(response) => response,
            Lookup::Machine(machine) => machine
                .fsm
                .lock()
                .on_commit_upload(&request.header, request.segment_location.clone()),
        }
    }

    pub async fn segment_commit_end(&self, request: &CommitEndRequest) -> CompletionResponse {
        let machine = match self.machine_for(&request.header, false).await {
            Lookup::Respond(response) => return response,
            Lookup::Machine(machine) => machine,
        };
        let action = machine.fsm.lock().on_commit_end(
            &request.header,
            request.row_count,
            request.size_bytes,
            Instant::now(),
        );
        match action {
            CommitEndAction::Respond(response) => response,
            CommitEndAction::Finalize(finalization) => {
                match self.finalize_commit(&finalization).await {
                    Ok(()) => {
                        self.remove(&machine.key, &machine.segment_name);
                        COUNTER_SEGMENTS_COMMITTED.inc();
                        observation::metrics::record_commit_duration(
                            finalization.commit_elapsed.as_secs_f64(),
                        );
                        info!(
                            "Segment {} committed at offset {}",
                            finalization.segment_name, finalization.target_offset
                        );
                        CompletionResponse::Processed
                    }
                    Err(e) => {
                        warn!(
                            "Failed to finalize commit of {}: {}",
                            finalization.segment_name, e
                        );
                        COUNTER_COMMIT_CONFLICTS.inc();
                        machine.fsm.lock().rollback_commit_end(Instant::now());
                        CompletionResponse::Hold
                    }
                }
            }
        }
    }

    /// Repair pass over every live machine, invoked by the supervisor. Lock
    /// discipline matches a request: the machine decides under its own lock,
    /// durable repairs run after releasing it.
    pub(crate) async fn sweep(&self, now: Instant) {
        for machine in self.snapshot() {
            let action = machine
                .fsm
                .lock()
                .check_timeout(now, self.config.completion.max_repair_attempts);
            match action {
                RepairAction::None => {}
                RepairAction::Rearbitrate { excluded } => {
                    warn!(
                        "Discarded commit decision of {}: committer {} never started",
                        machine.segment_name, excluded
                    );
                    COUNTER_STRAGGLER_REPAIRS.inc();
                }
                RepairAction::Abandon => {
                    COUNTER_STRAGGLER_REPAIRS.inc();
                    self.remove(&machine.key, &machine.segment_name);
                }
                RepairAction::Abort => {
                    COUNTER_STRAGGLER_REPAIRS.inc();
                    match self.persist_repair_pending(&machine.segment_name).await {
                        Ok(()) => {
                            COUNTER_SEGMENTS_ABORTED.inc();
                            self.remove(&machine.key, &machine.segment_name);
                            warn!(
                                "Aborted committing segment {}; the next report re-arbitrates a replacement",
                                machine.segment_name
                            );
                        }
                        Err(e) => {
                            warn!(
                                "Failed to persist repair marker for {}: {}; retrying next sweep",
                                machine.segment_name, e
                            );
                            machine.fsm.lock().rollback_abort(Instant::now());
                        }
                    }
                }
            }
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<CommitMachine>> {
        self.machines.lock().values().cloned().collect()
    }

    fn remove(&self, key: &PartitionKey, segment_name: &SegmentName) {
        let mut machines = self.machines.lock();
        if let Some(machine) = machines.get(key) {
            if machine.segment_name == *segment_name {
                machines.remove(key);
                GAUGE_LIVE_STATE_MACHINES.set(machines.len() as i64);
                info!("Retired commit state machine for {}", segment_name);
            }
        }
    }

    /// Route a report to its machine, seeding one when the partition has no
    /// live arbitration and the request type may start one.
    async fn machine_for(&self, header: &ReportHeader, may_seed: bool) -> Lookup {
        let key = header.segment_name.partition_key();
        if let Some(lookup) = self.lookup_live(&key, &header.segment_name) {
            return lookup;
        }

        // No live machine. Consult the durable record with no locks held.
        let record = match self.store.read_segment_record(&header.segment_name).await {
            Ok(record) => record,
            Err(e) => {
                error!(
                    "Metadata store read failed for {}: {}",
                    header.segment_name, e
                );
                return Lookup::Respond(CompletionResponse::Hold);
            }
        };
        match record {
            Some((record, _)) if record.status == SegmentStatus::Done => {
                // Late retransmission for a segment that already committed.
                Lookup::Respond(CompletionResponse::Processed)
            }
            Some(_) => {
                if !may_seed {
                    warn!(
                        "No live arbitration for {} and `{}` cannot start one",
                        header.segment_name, header.replica_id
                    );
                    return Lookup::Respond(CompletionResponse::Failed);
                }
                self.seed_machine(key, header.segment_name.clone())
            }
            None => {
                if !may_seed {
                    warn!("Unknown segment {}", header.segment_name);
                    return Lookup::Respond(CompletionResponse::Failed);
                }
                match self.bootstrap_record(&header.segment_name).await {
                    Ok(()) => self.seed_machine(key, header.segment_name.clone()),
                    Err(response) => Lookup::Respond(response),
                }
            }
        }
    }

    fn lookup_live(&self, key: &PartitionKey, segment_name: &SegmentName) -> Option<Lookup> {
        let machines = self.machines.lock();
        let machine = machines.get(key)?;
        Some(Self::match_sequence(machine, segment_name))
    }

    fn match_sequence(machine: &Arc<CommitMachine>, segment_name: &SegmentName) -> Lookup {
        match machine
            .segment_name
            .sequence_number()
            .cmp(&segment_name.sequence_number())
        {
            Ordering::Equal => Lookup::Machine(Arc::clone(machine)),
            // The report is for an earlier, already-resolved segment.
            Ordering::Greater => Lookup::Respond(CompletionResponse::Processed),
            // The replica claims a segment this coordinator has never opened.
            Ordering::Less => {
                warn!(
                    "Report for {} is ahead of the active segment {}",
                    segment_name, machine.segment_name
                );
                Lookup::Respond(CompletionResponse::Failed)
            }
        }
    }

    fn seed_machine(&self, key: PartitionKey, segment_name: SegmentName) -> Lookup {
        let mut machines = self.machines.lock();
        match machines.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                // Lost a seeding race; re-resolve against the winner.
                Self::match_sequence(occupied.get(), &segment_name)
            }
            Entry::Vacant(vacant) => {
                let fsm = SegmentCommitFsm::new(
                    segment_name.clone(),
                    self.config.completion.election_hold(),
                    self.config.completion.commit_timeout(),
                    Instant::now(),
                );
                let machine = Arc::new(CommitMachine {
                    key,
                    segment_name,
                    fsm: Mutex::new(fsm),
                });
                vacant.insert(Arc::clone(&machine));
                GAUGE_LIVE_STATE_MACHINES.set(machines.len() as i64);
                info!("Created commit state machine for {}", machine.segment_name);
                Lookup::Machine(machine)
            }
        }
    }

    /// Carve the durable record for a segment the store has never seen.
    /// Sequence zero is a partition's first contact; anything later must
    /// descend from a committed predecessor.
    async fn bootstrap_record(&self, segment_name: &SegmentName) -> Result<(), CompletionResponse> {
        let record = if segment_name.sequence_number() == 0 {
            let threshold = self
                .flush
                .for_table(segment_name.table_name())
                .rows_threshold(None);
            SegmentRecord::in_progress(segment_name.clone(), Offset::ZERO, threshold, now_ms())
        } else {
            let predecessor = SegmentName::new(
                segment_name.table_name(),
                segment_name.partition_group_id(),
                segment_name.sequence_number() - 1,
            );
            match self.store.read_segment_record(&predecessor).await {
                Ok(Some((prev, _))) if prev.status == SegmentStatus::Done => {
                    let start = prev.end_offset.unwrap_or(prev.start_offset);
                    SegmentRecord::in_progress(
                        segment_name.clone(),
                        start,
                        prev.flush_rows_threshold,
                        now_ms(),
                    )
                }
                Ok(_) => {
                    warn!(
                        "Segment {} has no committed predecessor, refusing to seed",
                        segment_name
                    );
                    return Err(CompletionResponse::Failed);
                }
                Err(e) => {
                    error!("Metadata store read failed for {}: {}", predecessor, e);
                    return Err(CompletionResponse::Hold);
                }
            }
        };

        match self
            .store
            .create_segment_record(segment_name, record)
            .await
        {
            Ok(_) => {
                info!("Created segment record for first contact: {}", segment_name);
                Ok(())
            }
            // Another request got there first; the record exists, proceed.
            Err(MetaError::AlreadyExists(_)) => Ok(()),
            Err(e) => {
                error!("Failed to create segment record {}: {}", segment_name, e);
                Err(CompletionResponse::Hold)
            }
        }
    }

    async fn persist_committing(&self, segment_name: &SegmentName) -> Result<(), MetaError> {
        let Some((mut record, version)) = self.store.read_segment_record(segment_name).await?
        else {
            return Err(MetaError::NotFound(segment_name.to_string()));
        };
        if record.status == SegmentStatus::Committing {
            // Already durable from a previous attempt.
            return Ok(());
        }
        record.status = SegmentStatus::Committing;
        self.store
            .write_segment_record(segment_name, record, version)
            .await?;
        Ok(())
    }

    /// The durable commit sequence: mark the record `Done` with final
    /// statistics, feed the sizing loop, and carve the successor's record.
    async fn finalize_commit(&self, finalization: &CommitFinalization) -> Result<(), MetaError> {
        let segment_name = &finalization.segment_name;
        let Some((mut record, version)) = self.store.read_segment_record(segment_name).await?
        else {
            return Err(MetaError::NotFound(segment_name.to_string()));
        };
        if record.status == SegmentStatus::Done {
            // A previous attempt made it through; nothing left to do.
            return Ok(());
        }

        record.status = SegmentStatus::Done;
        record.end_offset = Some(finalization.target_offset);
        record.row_count = finalization.row_count;
        record.size_bytes = finalization.size_bytes;
        record.segment_location = finalization.segment_location.clone();
        let committing = CommittingSegment {
            row_count: finalization.row_count,
            size_bytes: finalization.size_bytes,
            rows_threshold: record.flush_rows_threshold,
            consumption_time: consumption_time(record.creation_time_ms),
        };
        self.store
            .write_segment_record(segment_name, record, version)
            .await?;

        // The commit is durable; size the successor and carve its record.
        // A failure past this point is recoverable at seed time, so it must
        // not roll the commit back.
        let threshold = self
            .flush
            .for_table(segment_name.table_name())
            .rows_threshold(Some(&committing));
        let next = segment_name.next();
        let next_record = SegmentRecord::in_progress(
            next.clone(),
            finalization.target_offset,
            threshold,
            now_ms(),
        );
        match self.store.create_segment_record(&next, next_record).await {
            Ok(_) => {
                info!(
                    "Created next segment record {} with rows threshold {}",
                    next, threshold
                );
            }
            Err(MetaError::AlreadyExists(_)) => {}
            Err(e) => {
                error!("Failed to create next segment record {}: {}", next, e);
            }
        }
        Ok(())
    }

    async fn persist_repair_pending(&self, segment_name: &SegmentName) -> Result<(), MetaError> {
        let Some((mut record, version)) = self.store.read_segment_record(segment_name).await?
        else {
            // Nothing durable to repair.
            return Ok(());
        };
        match record.status {
            SegmentStatus::Done | SegmentStatus::RepairPending => Ok(()),
            _ => {
                record.status = SegmentStatus::RepairPending;
                self.store
                    .write_segment_record(segment_name, record, version)
                    .await?;
                Ok(())
            }
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn consumption_time(creation_time_ms: i64) -> Duration {
    let elapsed = now_ms() - creation_time_ms;
    Duration::from_millis(elapsed.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use metastore::{MemorySegmentStore, MockSegmentStore};
    use model::{ReplicaId, StopReason};

    use super::*;

    fn test_config() -> Arc<Configuration> {
        let mut config = Configuration::default();
        // Make elections immediate and every commit window already expired,
        // so tests drive the protocol without sleeping.
        config.completion.election_hold_ms = 0;
        config.completion.commit_timeout_ms = 0;
        Arc::new(config)
    }

    fn registry() -> CompletionRegistry<MemorySegmentStore> {
        let config = test_config();
        let flush = Arc::new(FlushThresholds::new(config.flush.clone()));
        CompletionRegistry::new(config, Arc::new(MemorySegmentStore::new()), flush)
    }

    fn header(segment: &SegmentName, replica: &str, offset: u64) -> ReportHeader {
        ReportHeader {
            segment_name: segment.clone(),
            replica_id: ReplicaId::from(replica),
            offset: Offset::new(offset),
        }
    }

    fn consumed(segment: &SegmentName, replica: &str, offset: u64) -> ConsumedRequest {
        ConsumedRequest {
            header: header(segment, replica, offset),
            reason: StopReason::RowLimit,
        }
    }

    async fn drive_commit(
        registry: &CompletionRegistry<MemorySegmentStore>,
        segment: &SegmentName,
        replica: &str,
        offset: u64,
        row_count: u64,
        size_bytes: u64,
    ) {
        let response = registry
            .segment_consumed(&consumed(segment, replica, offset))
            .await;
        assert!(
            matches!(response, CompletionResponse::Commit { .. }),
            "unexpected {:?}",
            response
        );
        let response = registry
            .segment_commit_start(&CommitStartRequest {
                header: header(segment, replica, offset),
            })
            .await;
        assert!(matches!(response, CompletionResponse::Commit { .. }));
        let response = registry
            .segment_commit_upload(&CommitUploadRequest {
                header: header(segment, replica, offset),
                segment_location: format!("s3://bucket/{}", segment),
            })
            .await;
        assert_eq!(CompletionResponse::Processed, response);
        let response = registry
            .segment_commit_end(&CommitEndRequest {
                header: header(segment, replica, offset),
                row_count,
                size_bytes,
            })
            .await;
        assert_eq!(CompletionResponse::Processed, response);
    }

    #[tokio::test]
    async fn test_full_commit_cycle_persists_records() {
        ulog::try_init_log();
        let registry = registry();
        let segment = SegmentName::new("orders", 0, 0);
        drive_commit(&registry, &segment, "server-1", 105, 100_000, 400_000_000).await;

        // The machine is retired.
        assert!(registry.snapshot().is_empty());

        let (record, _) = registry
            .store
            .read_segment_record(&segment)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(SegmentStatus::Done, record.status);
        assert_eq!(Some(Offset::new(105)), record.end_offset);
        assert_eq!(100_000, record.row_count);
        assert_eq!(400_000_000, record.size_bytes);
        assert_eq!(
            Some("s3://bucket/orders__0__0".to_owned()),
            record.segment_location
        );

        // The successor starts where the commit ended, sized by the ratio
        // feedback (0.00025 rows per byte at the default 500 MiB ideal).
        let (next, _) = registry
            .store
            .read_segment_record(&segment.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(SegmentStatus::InProgress, next.status);
        assert_eq!(Offset::new(105), next.start_offset);
        assert_eq!(131_072, next.flush_rows_threshold);
    }

    #[tokio::test]
    async fn test_commit_end_replay_is_processed() {
        ulog::try_init_log();
        let registry = registry();
        let segment = SegmentName::new("orders", 0, 0);
        drive_commit(&registry, &segment, "server-1", 105, 100_000, 400_000_000).await;

        // The machine is gone, the record says Done: replays are acknowledged.
        let response = registry
            .segment_commit_end(&CommitEndRequest {
                header: header(&segment, "server-1", 105),
                row_count: 100_000,
                size_bytes: 400_000_000,
            })
            .await;
        assert_eq!(CompletionResponse::Processed, response);

        let response = registry
            .segment_consumed(&consumed(&segment, "server-2", 104))
            .await;
        assert_eq!(CompletionResponse::Processed, response);
    }

    #[tokio::test]
    async fn test_stale_and_ahead_sequences() {
        ulog::try_init_log();
        let registry = registry();
        let segment = SegmentName::new("orders", 0, 1);
        // Sequence 1 cannot be seeded without a committed predecessor.
        let response = registry
            .segment_consumed(&consumed(&segment, "server-1", 10))
            .await;
        assert_eq!(CompletionResponse::Failed, response);

        // Commit sequence 0, then seed sequence 1 legitimately.
        let first = SegmentName::new("orders", 0, 0);
        drive_commit(&registry, &first, "server-1", 105, 100_000, 400_000_000).await;
        let response = registry
            .segment_consumed(&consumed(&segment, "server-1", 200))
            .await;
        assert!(matches!(response, CompletionResponse::Commit { .. }));

        // A report far ahead of the live machine is a violation.
        let ahead = SegmentName::new("orders", 0, 7);
        let response = registry
            .segment_consumed(&consumed(&ahead, "server-1", 900))
            .await;
        assert_eq!(CompletionResponse::Failed, response);
    }

    #[tokio::test]
    async fn test_commit_start_for_unknown_segment_fails() {
        ulog::try_init_log();
        let registry = registry();
        let segment = SegmentName::new("orders", 0, 0);
        let response = registry
            .segment_commit_start(&CommitStartRequest {
                header: header(&segment, "server-1", 105),
            })
            .await;
        assert_eq!(CompletionResponse::Failed, response);
    }

    #[tokio::test]
    async fn test_sweep_aborts_committing_straggler() {
        ulog::try_init_log();
        let registry = registry();
        let segment = SegmentName::new("orders", 0, 0);

        // server-1 wins and starts committing, then goes silent.
        let response = registry
            .segment_consumed(&consumed(&segment, "server-1", 105))
            .await;
        assert!(matches!(response, CompletionResponse::Commit { .. }));
        let response = registry
            .segment_commit_start(&CommitStartRequest {
                header: header(&segment, "server-1", 105),
            })
            .await;
        assert!(matches!(response, CompletionResponse::Commit { .. }));

        // The commit window (zero in tests) has lapsed: abort and mark for
        // repair.
        registry.sweep(Instant::now()).await;
        assert!(registry.snapshot().is_empty());
        let (record, _) = registry
            .store
            .read_segment_record(&segment)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(SegmentStatus::RepairPending, record.status);

        // A surviving replica re-seeds a replacement for the same segment
        // and commits it.
        drive_commit(&registry, &segment, "server-2", 103, 90_000, 380_000_000).await;
        let (record, _) = registry
            .store
            .read_segment_record(&segment)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(SegmentStatus::Done, record.status);
        assert_eq!(Some(Offset::new(103)), record.end_offset);
    }

    #[tokio::test]
    async fn test_sweep_rearbitrates_before_commit_start() {
        ulog::try_init_log();
        let registry = registry();
        let segment = SegmentName::new("orders", 0, 0);

        let response = registry
            .segment_consumed(&consumed(&segment, "server-1", 105))
            .await;
        assert!(matches!(response, CompletionResponse::Commit { .. }));

        // No commit start arrives; the sweep throws the decision away but
        // keeps the machine and the durable record untouched.
        registry.sweep(Instant::now()).await;
        let machines = registry.snapshot();
        assert_eq!(1, machines.len());
        let (record, _) = registry
            .store
            .read_segment_record(&segment)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(SegmentStatus::InProgress, record.status);

        // The ex-committer is excluded for one cycle, so another replica's
        // report wins the replacement election.
        let response = registry
            .segment_consumed(&consumed(&segment, "server-2", 104))
            .await;
        assert!(
            matches!(response, CompletionResponse::Commit { .. }),
            "unexpected {:?}",
            response
        );
    }

    #[tokio::test]
    async fn test_commit_start_conflict_rolls_back() {
        ulog::try_init_log();
        let segment = SegmentName::new("orders", 0, 0);
        let record = SegmentRecord::in_progress(segment.clone(), Offset::ZERO, 100_000, 0);

        let mut store = MockSegmentStore::new();
        {
            let record = record.clone();
            store
                .expect_read_segment_record()
                .returning(move |_| Ok(Some((record.clone(), 0))));
        }
        let mut seq = mockall::Sequence::new();
        store
            .expect_write_segment_record()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| {
                Err(MetaError::Conflict {
                    expected: 0,
                    actual: 1,
                })
            });
        store
            .expect_write_segment_record()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(1));

        let config = test_config();
        let flush = Arc::new(FlushThresholds::new(config.flush.clone()));
        let registry = CompletionRegistry::new(config, Arc::new(store), flush);

        let response = registry
            .segment_consumed(&consumed(&segment, "server-1", 105))
            .await;
        assert!(matches!(response, CompletionResponse::Commit { .. }));

        // The version conflict rolls the machine back; the caller sees HOLD
        // and retries.
        let start = CommitStartRequest {
            header: header(&segment, "server-1", 105),
        };
        assert_eq!(
            CompletionResponse::Hold,
            registry.segment_commit_start(&start).await
        );
        assert!(matches!(
            registry.segment_commit_start(&start).await,
            CompletionResponse::Commit { .. }
        ));
    }

    #[tokio::test]
    async fn test_first_contact_creates_record() {
        ulog::try_init_log();
        let registry = registry();
        let segment = SegmentName::new("orders", 3, 0);
        registry
            .segment_consumed(&consumed(&segment, "server-1", 50))
            .await;

        let (record, _) = registry
            .store
            .read_segment_record(&segment)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(SegmentStatus::InProgress, record.status);
        assert_eq!(Offset::ZERO, record.start_offset);
        assert_eq!(100_000, record.flush_rows_threshold);
    }
}
