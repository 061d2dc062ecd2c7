use std::collections::HashMap;
use std::fmt;

use log::trace;
use metastore::SegmentStore;
use model::request::CommitEndRequest;
use model::CompletionResponse;

use super::{parse_header, require, PARAM_ROW_COUNT, PARAM_SIZE_BYTES};
use crate::completion::SegmentCompletionManager;
use crate::error::ServiceError;

/// `/segmentCommitEnd`: the committer confirms the artifact is durable and
/// reports final statistics, which feed the next segment's sizing.
#[derive(Debug)]
pub(crate) struct CommitEnd {
    request: CommitEndRequest,
}

impl CommitEnd {
    pub(crate) fn parse_params(params: &HashMap<String, String>) -> Result<Self, ServiceError> {
        let header = parse_header(params)?;
        let row_count = require(params, PARAM_ROW_COUNT)?
            .parse::<u64>()
            .map_err(|_| ServiceError::InvalidParameter(PARAM_ROW_COUNT))?;
        let size_bytes = require(params, PARAM_SIZE_BYTES)?
            .parse::<u64>()
            .map_err(|_| ServiceError::InvalidParameter(PARAM_SIZE_BYTES))?;
        Ok(Self {
            request: CommitEndRequest {
                header,
                row_count,
                size_bytes,
            },
        })
    }

    pub(crate) async fn apply<S>(
        &self,
        manager: &SegmentCompletionManager<S>,
    ) -> CompletionResponse
    where
        S: SegmentStore,
    {
        let response = manager.segment_commit_end(&self.request).await;
        trace!("segmentCommitEnd [{}] -> {}", self.request.header, response);
        response
    }
}

impl fmt::Display for CommitEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "segmentCommitEnd[{}, rows={}, sizeBytes={}]",
            self.request.header, self.request.row_count, self.request.size_bytes
        )
    }
}
