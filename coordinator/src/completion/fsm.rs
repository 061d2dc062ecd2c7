use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use log::{info, warn};
use minstant::Instant;
use model::request::ReportHeader;
use model::{CompletionResponse, Offset, ReplicaId, ReplicaReport, SegmentName, StopReason};
use observation::metrics::COUNTER_COMMITTER_ELECTIONS;

/// Commit decision for one segment: who builds, and up to where. Immutable
/// once fixed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CommitDecision {
    pub(crate) segment_name: SegmentName,

    pub(crate) committer: ReplicaId,

    pub(crate) target_offset: Offset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FsmState {
    Holding,
    CommitterChosen,
    Committing,
    Committed,
    Aborted,
}

/// What the caller must do after `on_commit_start` returns.
#[derive(Debug, PartialEq)]
pub(crate) enum CommitStartAction {
    Respond(CompletionResponse),

    /// Local state moved to `Committing`; persist the status, then answer
    /// `Commit` on success or roll back and answer `Hold` on conflict.
    Persist {
        target_offset: Offset,
        build_time_ms: u64,
    },
}

/// What the caller must do after `on_commit_end` returns.
#[derive(Debug, PartialEq)]
pub(crate) enum CommitEndAction {
    Respond(CompletionResponse),

    /// Local state moved to `Committed`; run the durable commit sequence,
    /// then retire the machine on success or roll back on conflict.
    Finalize(CommitFinalization),
}

#[derive(Debug, PartialEq)]
pub(crate) struct CommitFinalization {
    pub(crate) segment_name: SegmentName,

    pub(crate) target_offset: Offset,

    pub(crate) row_count: u64,

    pub(crate) size_bytes: u64,

    pub(crate) segment_location: Option<String>,

    /// Wall time since the committer was elected, for metrics.
    pub(crate) commit_elapsed: Duration,
}

/// Repair verdict of a supervisor sweep over one machine.
#[derive(Debug, PartialEq)]
pub(crate) enum RepairAction {
    None,

    /// The chosen committer never started committing: decision discarded,
    /// machine is `Holding` again with the ex-committer excluded for one
    /// decision cycle.
    Rearbitrate { excluded: ReplicaId },

    /// Repair attempts exhausted before a commit ever started; the machine
    /// is dropped without touching the durable record.
    Abandon,

    /// A commit was in flight and timed out: machine is `Aborted` locally;
    /// persist the repair-pending marker, then retire the machine.
    Abort,
}

/// Per-segment arbitration state machine.
///
/// `Holding` collects replica reports and answers `Hold` until the election
/// window lapses (or a forced stop arrives), so that a later higher-offset
/// report can still pre-empt an earlier one. The first report processed
/// after the window fixes the decision; from then on the committer is told
/// `Commit` and everyone else `CatchUp`/`KeepAlive` relative to the target
/// offset.
///
/// The machine itself never touches the metadata store. Transitions that
/// require durability return an action for the caller to execute after
/// releasing the machine's lock, with a matching rollback method for the
/// conflict path.
pub(crate) struct SegmentCommitFsm {
    log_ident: String,

    segment_name: SegmentName,

    election_hold: Duration,

    commit_timeout: Duration,

    state: FsmState,

    reports: HashMap<ReplicaId, ReplicaReport>,

    /// Replicas out of candidacy for the current decision cycle; cleared
    /// when a decision is fixed.
    excluded: HashSet<ReplicaId>,

    decision: Option<CommitDecision>,

    decision_at: Option<Instant>,

    segment_location: Option<String>,

    state_since: Instant,

    repair_attempts: u32,
}

impl SegmentCommitFsm {
    pub(crate) fn new(
        segment_name: SegmentName,
        election_hold: Duration,
        commit_timeout: Duration,
        now: Instant,
    ) -> Self {
        let log_ident = format!("Segment[{}] ", segment_name);
        Self {
            log_ident,
            segment_name,
            election_hold,
            commit_timeout,
            state: FsmState::Holding,
            reports: HashMap::new(),
            excluded: HashSet::new(),
            decision: None,
            decision_at: None,
            segment_location: None,
            state_since: now,
            repair_attempts: 0,
        }
    }

    pub(crate) fn state(&self) -> FsmState {
        self.state
    }

    pub(crate) fn decision(&self) -> Option<&CommitDecision> {
        self.decision.as_ref()
    }

    fn build_time_ms(&self) -> u64 {
        self.commit_timeout.as_millis() as u64
    }

    fn offset_regressed(&self, replica_id: &ReplicaId, offset: Offset) -> bool {
        self.reports
            .get(replica_id)
            .map(|report| offset < report.offset)
            .unwrap_or(false)
    }

    fn record_report(&mut self, header: &ReportHeader, reason: StopReason, now: Instant) {
        self.reports.insert(
            header.replica_id.clone(),
            ReplicaReport {
                replica_id: header.replica_id.clone(),
                offset: header.offset,
                reason,
                received: now,
            },
        );
    }

    fn election_due(&self, now: Instant) -> bool {
        if now.duration_since(self.state_since) >= self.election_hold {
            return true;
        }
        // An explicit stop signal flushes immediately.
        self.reports
            .values()
            .any(|report| report.reason == StopReason::ForcedStop)
    }

    /// Pick the winner among non-excluded reports: maximum offset, then
    /// earliest report, then lexically smallest replica id.
    fn elect(&mut self, now: Instant) -> bool {
        let winner = self
            .reports
            .values()
            .filter(|report| !self.excluded.contains(&report.replica_id))
            .max_by(|a, b| {
                a.offset
                    .cmp(&b.offset)
                    .then_with(|| b.received.cmp(&a.received))
                    .then_with(|| b.replica_id.cmp(&a.replica_id))
            });
        let Some(winner) = winner else {
            // Everyone is excluded; reopen candidacy so the next report can
            // win instead of wedging the machine.
            self.excluded.clear();
            return false;
        };
        let decision = CommitDecision {
            segment_name: self.segment_name.clone(),
            committer: winner.replica_id.clone(),
            target_offset: winner.offset,
        };
        info!(
            "{}Committer chosen: replica={}, target offset={}",
            self.log_ident, decision.committer, decision.target_offset
        );
        self.decision = Some(decision);
        self.decision_at = Some(now);
        self.excluded.clear();
        self.state = FsmState::CommitterChosen;
        self.state_since = now;
        COUNTER_COMMITTER_ELECTIONS.inc();
        true
    }

    /// Answer for a replica report once a decision exists.
    fn respond_after_decision(&self, replica_id: &ReplicaId, offset: Offset) -> CompletionResponse {
        let decision = self
            .decision
            .as_ref()
            .expect("decision must exist past Holding");
        if *replica_id == decision.committer {
            return CompletionResponse::Commit {
                offset: decision.target_offset,
                build_time_ms: self.build_time_ms(),
            };
        }
        if offset < decision.target_offset {
            CompletionResponse::CatchUp {
                offset: decision.target_offset,
            }
        } else {
            CompletionResponse::KeepAlive
        }
    }

    pub(crate) fn on_consumed(
        &mut self,
        header: &ReportHeader,
        reason: StopReason,
        now: Instant,
    ) -> CompletionResponse {
        if self.offset_regressed(&header.replica_id, header.offset) {
            warn!(
                "{}Replica {} reported offset {} behind its previous report",
                self.log_ident, header.replica_id, header.offset
            );
            return CompletionResponse::Failed;
        }
        self.record_report(header, reason, now);

        match self.state {
            FsmState::Holding => {
                if self.election_due(now) && self.elect(now) {
                    self.respond_after_decision(&header.replica_id, header.offset)
                } else {
                    CompletionResponse::Hold
                }
            }
            FsmState::CommitterChosen => {
                self.respond_after_decision(&header.replica_id, header.offset)
            }
            FsmState::Committing => {
                let decision = self.decision.as_ref().expect("committing has a decision");
                if header.replica_id == decision.committer {
                    // The committer already holds a COMMIT answer.
                    CompletionResponse::Processed
                } else if header.offset < decision.target_offset {
                    CompletionResponse::CatchUp {
                        offset: decision.target_offset,
                    }
                } else {
                    CompletionResponse::KeepAlive
                }
            }
            FsmState::Committed | FsmState::Aborted => CompletionResponse::Processed,
        }
    }

    pub(crate) fn on_stopped_consuming(
        &mut self,
        header: &ReportHeader,
        reason: &str,
        now: Instant,
    ) -> CompletionResponse {
        if self.offset_regressed(&header.replica_id, header.offset) {
            warn!(
                "{}Replica {} reported offset {} behind its previous report",
                self.log_ident, header.replica_id, header.offset
            );
            return CompletionResponse::Failed;
        }
        warn!(
            "{}Replica {} stopped consuming at {}: {}",
            self.log_ident, header.replica_id, header.offset, reason
        );
        self.record_report(header, StopReason::Exception, now);
        if self.state == FsmState::Holding {
            self.excluded.insert(header.replica_id.clone());
        }
        CompletionResponse::Processed
    }

    pub(crate) fn on_commit_start(
        &mut self,
        header: &ReportHeader,
        now: Instant,
    ) -> CommitStartAction {
        match (&self.state, &self.decision) {
            (FsmState::CommitterChosen, Some(decision))
                if header.replica_id == decision.committer =>
            {
                info!(
                    "{}Commit started by {} towards {}",
                    self.log_ident, decision.committer, decision.target_offset
                );
                let target_offset = decision.target_offset;
                self.state = FsmState::Committing;
                self.state_since = now;
                CommitStartAction::Persist {
                    target_offset,
                    build_time_ms: self.build_time_ms(),
                }
            }
            _ => {
                // Retransmissions and non-committers are acknowledged, never
                // punished.
                CommitStartAction::Respond(CompletionResponse::Processed)
            }
        }
    }

    pub(crate) fn rollback_commit_start(&mut self, now: Instant) {
        if self.state == FsmState::Committing {
            self.state = FsmState::CommitterChosen;
            self.state_since = now;
        }
    }

    pub(crate) fn on_commit_upload(
        &mut self,
        header: &ReportHeader,
        segment_location: String,
    ) -> CompletionResponse {
        match (&self.state, &self.decision) {
            (FsmState::Committing, Some(decision))
                if header.replica_id == decision.committer =>
            {
                info!(
                    "{}Artifact uploaded to `{}`",
                    self.log_ident, segment_location
                );
                self.segment_location = Some(segment_location);
                CompletionResponse::Processed
            }
            _ => {
                warn!(
                    "{}Ignoring upload report from {} in state {:?}",
                    self.log_ident, header.replica_id, self.state
                );
                CompletionResponse::Processed
            }
        }
    }

    pub(crate) fn on_commit_end(
        &mut self,
        header: &ReportHeader,
        row_count: u64,
        size_bytes: u64,
        now: Instant,
    ) -> CommitEndAction {
        let Some(decision) = self.decision.as_ref() else {
            warn!(
                "{}Commit end from {} but no decision exists",
                self.log_ident, header.replica_id
            );
            return CommitEndAction::Respond(CompletionResponse::Failed);
        };
        if header.replica_id != decision.committer {
            warn!(
                "{}Commit end from {} which is not the committer {}",
                self.log_ident, header.replica_id, decision.committer
            );
            return CommitEndAction::Respond(CompletionResponse::Failed);
        }
        match self.state {
            FsmState::Committing => {
                let finalization = CommitFinalization {
                    segment_name: self.segment_name.clone(),
                    target_offset: decision.target_offset,
                    row_count,
                    size_bytes,
                    segment_location: self.segment_location.clone(),
                    commit_elapsed: self
                        .decision_at
                        .map(|at| now.duration_since(at))
                        .unwrap_or_default(),
                };
                self.state = FsmState::Committed;
                self.state_since = now;
                CommitEndAction::Finalize(finalization)
            }
            // The committer skipped commit-start, e.g. the start answer was
            // lost and the commit-start retransmission has not landed yet.
            FsmState::CommitterChosen => CommitEndAction::Respond(CompletionResponse::Hold),
            FsmState::Committed => CommitEndAction::Respond(CompletionResponse::Processed),
            _ => CommitEndAction::Respond(CompletionResponse::Hold),
        }
    }

    pub(crate) fn rollback_commit_end(&mut self, now: Instant) {
        if self.state == FsmState::Committed {
            self.state = FsmState::Committing;
            self.state_since = now;
        }
    }

    pub(crate) fn rollback_abort(&mut self, now: Instant) {
        if self.state == FsmState::Aborted {
            self.state = FsmState::Committing;
            self.state_since = now;
        }
    }

    /// Supervisor entry point: decide whether this machine is stuck and how
    /// to resolve it. Only the local transition happens here; durable
    /// repairs are the caller's to run after releasing the lock.
    pub(crate) fn check_timeout(&mut self, now: Instant, max_repair_attempts: u32) -> RepairAction {
        let stuck = now.duration_since(self.state_since) >= self.commit_timeout;
        if !stuck {
            return RepairAction::None;
        }
        match self.state {
            FsmState::CommitterChosen => {
                self.repair_attempts += 1;
                let decision = self.decision.take().expect("chosen state has a decision");
                self.decision_at = None;
                if self.repair_attempts > max_repair_attempts {
                    warn!(
                        "{}Repair attempts exhausted ({}), abandoning",
                        self.log_ident, self.repair_attempts
                    );
                    self.state = FsmState::Aborted;
                    self.state_since = now;
                    return RepairAction::Abandon;
                }
                warn!(
                    "{}Committer {} never started committing, re-arbitrating",
                    self.log_ident, decision.committer
                );
                self.excluded.insert(decision.committer.clone());
                self.state = FsmState::Holding;
                self.state_since = now;
                RepairAction::Rearbitrate {
                    excluded: decision.committer,
                }
            }
            FsmState::Committing => {
                self.repair_attempts += 1;
                warn!("{}Commit timed out, aborting segment", self.log_ident);
                self.state = FsmState::Aborted;
                self.state_since = now;
                RepairAction::Abort
            }
            _ => RepairAction::None,
        }
    }
}

impl fmt::Display for SegmentCommitFsm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}state={:?}, reports={}, committer={:?}",
            self.log_ident,
            self.state,
            self.reports.len(),
            self.decision.as_ref().map(|d| d.committer.as_str())
        )
    }
}
