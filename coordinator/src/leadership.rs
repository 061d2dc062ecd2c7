use std::sync::Arc;

use log::info;
use metastore::SegmentStore;
use tokio::sync::watch;

#[cfg(test)]
use mockall::automock;

use crate::completion::SegmentCompletionManager;

/// The external election collaborator. Exactly one coordinator instance
/// observes `true` at a time; everything else about the mechanism (ZooKeeper,
/// etcd, ...) stays behind this trait.
#[cfg_attr(test, automock)]
pub trait LeaderElection: Send + Sync {
    /// Current and future leadership of this process.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Election for single-instance deployments and tests: leadership is granted
/// immediately and never revoked.
#[derive(Debug)]
pub struct StandaloneElection {
    tx: watch::Sender<bool>,
}

impl StandaloneElection {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx }
    }
}

impl Default for StandaloneElection {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaderElection for StandaloneElection {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Drive the manager's lifecycle callbacks from the election signal. The
/// task ends when the election provider goes away, dropping leadership on
/// the way out.
pub fn watch_leadership<S, E>(
    manager: Arc<SegmentCompletionManager<S>>,
    election: &E,
) -> tokio::task::JoinHandle<()>
where
    S: SegmentStore,
    E: LeaderElection + ?Sized,
{
    let mut rx = election.subscribe();
    tokio::spawn(async move {
        loop {
            if *rx.borrow_and_update() {
                manager.on_become_leader();
            } else {
                manager.on_lose_leadership();
            }
            if rx.changed().await.is_err() {
                info!("Leader election channel closed");
                manager.on_lose_leadership();
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use config::Configuration;
    use metastore::MemorySegmentStore;
    use tokio::time::sleep;

    use super::*;

    fn manager() -> Arc<SegmentCompletionManager<MemorySegmentStore>> {
        Arc::new(SegmentCompletionManager::new(
            Arc::new(Configuration::default()),
            Arc::new(MemorySegmentStore::new()),
        ))
    }

    #[tokio::test]
    async fn test_standalone_election_grants_immediately() {
        ulog::try_init_log();
        let manager = manager();
        let election = StandaloneElection::new();
        let handle = watch_leadership(Arc::clone(&manager), &election);
        sleep(Duration::from_millis(50)).await;
        assert!(manager.is_leader());
        handle.abort();
    }

    #[tokio::test]
    async fn test_leadership_toggles_lifecycle() {
        ulog::try_init_log();
        let manager = manager();
        let (tx, rx) = watch::channel(false);
        let mut election = MockLeaderElection::new();
        election.expect_subscribe().return_once(move || rx);

        let handle = watch_leadership(Arc::clone(&manager), &election);
        sleep(Duration::from_millis(50)).await;
        assert!(!manager.is_leader());

        tx.send(true).unwrap();
        sleep(Duration::from_millis(50)).await;
        assert!(manager.is_leader());

        tx.send(false).unwrap();
        sleep(Duration::from_millis(50)).await;
        assert!(!manager.is_leader());

        // Provider teardown revokes leadership as well.
        tx.send(true).unwrap();
        sleep(Duration::from_millis(50)).await;
        drop(tx);
        sleep(Duration::from_millis(50)).await;
        assert!(!manager.is_leader());
        handle.await.unwrap();
    }
}
