use std::collections::HashMap;
use std::fmt;

use log::trace;
use metastore::SegmentStore;
use model::request::CommitStartRequest;
use model::CompletionResponse;

use super::parse_header;
use crate::completion::SegmentCompletionManager;
use crate::error::ServiceError;

/// `/segmentCommitStart`: the committer declares it is about to build and
/// upload.
#[derive(Debug)]
pub(crate) struct CommitStart {
    request: CommitStartRequest,
}

impl CommitStart {
    pub(crate) fn parse_params(params: &HashMap<String, String>) -> Result<Self, ServiceError> {
        let header = parse_header(params)?;
        Ok(Self {
            request: CommitStartRequest { header },
        })
    }

    pub(crate) async fn apply<S>(
        &self,
        manager: &SegmentCompletionManager<S>,
    ) -> CompletionResponse
    where
        S: SegmentStore,
    {
        let response = manager.segment_commit_start(&self.request).await;
        trace!("segmentCommitStart [{}] -> {}", self.request.header, response);
        response
    }
}

impl fmt::Display for CommitStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segmentCommitStart[{}]", self.request.header)
    }
}
