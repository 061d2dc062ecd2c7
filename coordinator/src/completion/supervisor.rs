use std::sync::Arc;
use std::time::Duration;

use log::info;
use metastore::SegmentStore;
use minstant::Instant;
use tokio_util::sync::CancellationToken;

use super::registry::CompletionRegistry;

/// Background sweep that forces timed-out arbitrations to a resolution.
///
/// Replicas never observe the supervisor directly: a repaired machine simply
/// answers `Hold` again, and an aborted segment is re-arbitrated by the next
/// report. Each sweep takes a machine's lock exactly as a request would and
/// never holds it across a metadata-store call.
pub(crate) struct StragglerSupervisor<S> {
    registry: Arc<CompletionRegistry<S>>,

    interval: Duration,

    token: CancellationToken,
}

impl<S> StragglerSupervisor<S>
where
    S: SegmentStore,
{
    pub(crate) fn new(
        registry: Arc<CompletionRegistry<S>>,
        interval: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            registry,
            interval,
            token,
        }
    }

    pub(crate) fn run(self) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = self.token.cancelled() => {
                        info!("Straggler supervisor stopped");
                        break;
                    }

                    _ = interval.tick() => {
                        self.registry.sweep(Instant::now()).await;
                    }
                }
            }
        });
    }
}
