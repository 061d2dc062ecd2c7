use std::collections::HashMap;
use std::fmt;

use metastore::SegmentStore;
use model::CompletionResponse;
use observation::metrics::COUNTER_PROTOCOL_VIOLATIONS;

use super::commit_end::CommitEnd;
use super::commit_start::CommitStart;
use super::commit_upload::CommitUpload;
use super::consumed::Consumed;
use super::stopped_consuming::StoppedConsuming;
use crate::completion::SegmentCompletionManager;
use crate::error::ServiceError;

pub(crate) const PATH_CONSUMED: &str = "/segmentConsumed";
pub(crate) const PATH_STOPPED_CONSUMING: &str = "/segmentStoppedConsuming";
pub(crate) const PATH_COMMIT_START: &str = "/segmentCommitStart";
pub(crate) const PATH_COMMIT_UPLOAD: &str = "/segmentCommitUpload";
pub(crate) const PATH_COMMIT_END: &str = "/segmentCommitEnd";

#[derive(Debug)]
pub(crate) enum Command {
    Consumed(Consumed),
    StoppedConsuming(StoppedConsuming),
    CommitStart(CommitStart),
    CommitUpload(CommitUpload),
    CommitEnd(CommitEnd),
}

impl Command {
    pub(crate) fn from_path(
        path: &str,
        params: &HashMap<String, String>,
    ) -> Result<Command, ServiceError> {
        match path {
            PATH_CONSUMED => Ok(Command::Consumed(Consumed::parse_params(params)?)),

            PATH_STOPPED_CONSUMING => Ok(Command::StoppedConsuming(
                StoppedConsuming::parse_params(params)?,
            )),

            PATH_COMMIT_START => Ok(Command::CommitStart(CommitStart::parse_params(params)?)),

            PATH_COMMIT_UPLOAD => Ok(Command::CommitUpload(CommitUpload::parse_params(params)?)),

            PATH_COMMIT_END => Ok(Command::CommitEnd(CommitEnd::parse_params(params)?)),

            _ => Err(ServiceError::Unsupported(path.to_owned())),
        }
    }

    pub(crate) async fn apply<S>(
        &self,
        manager: &SegmentCompletionManager<S>,
    ) -> CompletionResponse
    where
        S: SegmentStore,
    {
        let response = match self {
            Command::Consumed(cmd) => cmd.apply(manager).await,
            Command::StoppedConsuming(cmd) => cmd.apply(manager).await,
            Command::CommitStart(cmd) => cmd.apply(manager).await,
            Command::CommitUpload(cmd) => cmd.apply(manager).await,
            Command::CommitEnd(cmd) => cmd.apply(manager).await,
        };
        if response == CompletionResponse::Failed {
            COUNTER_PROTOCOL_VIOLATIONS.inc();
        }
        response
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Consumed(cmd) => write!(f, "{}", cmd),
            Command::StoppedConsuming(cmd) => write!(f, "{}", cmd),
            Command::CommitStart(cmd) => write!(f, "{}", cmd),
            Command::CommitUpload(cmd) => write!(f, "{}", cmd),
            Command::CommitEnd(cmd) => write!(f, "{}", cmd),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use config::Configuration;
    use metastore::MemorySegmentStore;

    use super::super::test_util::params;
    use super::*;

    fn manager() -> SegmentCompletionManager<MemorySegmentStore> {
        let mut config = Configuration::default();
        config.completion.election_hold_ms = 0;
        SegmentCompletionManager::new(Arc::new(config), Arc::new(MemorySegmentStore::new()))
    }

    #[test]
    fn test_unknown_path_rejected() {
        assert_eq!(
            Err(ServiceError::Unsupported("/segmentShrug".to_owned())),
            Command::from_path("/segmentShrug", &params(&[])).map(|_| ())
        );
    }

    #[tokio::test]
    async fn test_dispatch_consumed() {
        ulog::try_init_log();
        let manager = manager();
        manager.on_become_leader();

        let command = Command::from_path(
            PATH_CONSUMED,
            &params(&[
                ("name", "orders__0__0"),
                ("instance", "server-1"),
                ("offset", "100"),
                ("reason", "ROW_LIMIT"),
            ]),
        )
        .unwrap();
        assert!(matches!(
            command.apply(&manager).await,
            CompletionResponse::Commit { .. }
        ));
    }

    #[tokio::test]
    async fn test_dispatch_without_leadership() {
        ulog::try_init_log();
        let manager = manager();
        let command = Command::from_path(
            PATH_COMMIT_START,
            &params(&[
                ("name", "orders__0__0"),
                ("instance", "server-1"),
                ("offset", "100"),
            ]),
        )
        .unwrap();
        assert_eq!(
            CompletionResponse::NotLeader,
            command.apply(&manager).await
        );
    }
}
