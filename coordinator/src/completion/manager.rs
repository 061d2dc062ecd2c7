use std::sync::Arc;

use config::Configuration;
use log::{info, warn};
use metastore::SegmentStore;
use model::request::{
    CommitEndRequest, CommitStartRequest, CommitUploadRequest, ConsumedRequest,
    StoppedConsumingRequest,
};
use model::CompletionResponse;
use observation::metrics::GAUGE_LIVE_STATE_MACHINES;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use super::registry::CompletionRegistry;
use super::supervisor::StragglerSupervisor;
use crate::flush::FlushThresholds;

struct LeaderState<S> {
    registry: Arc<CompletionRegistry<S>>,

    supervisor_token: CancellationToken,
}

/// Leadership-scoped facade over the completion protocol.
///
/// The registry and every state machine exist only while this process holds
/// leadership: acquiring it builds a fresh registry and starts the straggler
/// supervisor, losing it cancels the supervisor and drops all in-memory
/// arbitration state. Segments that were mid-flight are re-discovered from
/// their persisted records when replicas report to the next leader.
pub struct SegmentCompletionManager<S> {
    config: Arc<Configuration>,

    store: Arc<S>,

    /// Table sizing history survives leadership changes within the process;
    /// it is only a quality hint, not correctness-bearing state.
    flush: Arc<FlushThresholds>,

    leader: RwLock<Option<LeaderState<S>>>,
}

impl<S> SegmentCompletionManager<S>
where
    S: SegmentStore,
{
    pub fn new(config: Arc<Configuration>, store: Arc<S>) -> Self {
        let flush = Arc::new(FlushThresholds::new(config.flush.clone()));
        Self {
            config,
            store,
            flush,
            leader: RwLock::new(None),
        }
    }

    pub fn on_become_leader(&self) {
        let mut leader = self.leader.write();
        if leader.is_some() {
            return;
        }
        info!("Leadership acquired, initializing completion registry");
        let registry = Arc::new(CompletionRegistry::new(
            Arc::clone(&self.config),
            Arc::clone(&self.store),
            Arc::clone(&self.flush),
        ));
        let supervisor_token = CancellationToken::new();
        StragglerSupervisor::new(
            Arc::clone(&registry),
            self.config.completion.supervisor_interval(),
            supervisor_token.clone(),
        )
        .run();
        *leader = Some(LeaderState {
            registry,
            supervisor_token,
        });
    }

    pub fn on_lose_leadership(&self) {
        let state = self.leader.write().take();
        if let Some(state) = state {
            warn!("Leadership lost, dropping all in-memory completion state");
            state.supervisor_token.cancel();
            GAUGE_LIVE_STATE_MACHINES.set(0);
        }
    }

    pub fn is_leader(&self) -> bool {
        self.leader.read().is_some()
    }

    fn registry(&self) -> Option<Arc<CompletionRegistry<S>>> {
        self.leader
            .read()
            .as_ref()
            .map(|state| Arc::clone(&state.registry))
    }

    pub async fn segment_consumed(&self, request: &ConsumedRequest) -> CompletionResponse {
        match self.registry() {
            Some(registry) => registry.segment_consumed(request).await,
            None => CompletionResponse::NotLeader,
        }
    }

    pub async fn segment_stopped_consuming(
        &self,
        request: &StoppedConsumingRequest,
    ) -> CompletionResponse {
        match self.registry() {
            Some(registry) => registry.segment_stopped_consuming(request).await,
            None => CompletionResponse::NotLeader,
        }
    }

    pub async fn segment_commit_start(&self, request: &CommitStartRequest) -> CompletionResponse {
        match self.registry() {
            Some(registry) => registry.segment_commit_start(request).await,
            None => CompletionResponse::NotLeader,
        }
    }

    pub async fn segment_commit_upload(&self, request: &CommitUploadRequest) -> CompletionResponse {
        match self.registry() {
            Some(registry) => registry.segment_commit_upload(request).await,
            None => CompletionResponse::NotLeader,
        }
    }

    pub async fn segment_commit_end(&self, request: &CommitEndRequest) -> CompletionResponse {
        match self.registry() {
            Some(registry) => registry.segment_commit_end(request).await,
            None => CompletionResponse::NotLeader,
        }
    }
}
