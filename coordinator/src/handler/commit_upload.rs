use std::collections::HashMap;
use std::fmt;

use log::trace;
use metastore::SegmentStore;
use model::request::CommitUploadRequest;
use model::CompletionResponse;

use super::{parse_header, require, PARAM_LOCATION};
use crate::completion::SegmentCompletionManager;
use crate::error::ServiceError;

/// `/segmentCommitUpload`: the committer uploaded the built artifact and
/// hands back the retrievable reference. The transfer itself happened in
/// shared storage; only the location string passes through here.
#[derive(Debug)]
pub(crate) struct CommitUpload {
    request: CommitUploadRequest,
}

impl CommitUpload {
    pub(crate) fn parse_params(params: &HashMap<String, String>) -> Result<Self, ServiceError> {
        let header = parse_header(params)?;
        let segment_location = require(params, PARAM_LOCATION)?.to_owned();
        Ok(Self {
            request: CommitUploadRequest {
                header,
                segment_location,
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
        let response = manager.segment_commit_upload(&self.request).await;
        trace!(
            "segmentCommitUpload [{}] -> {}",
            self.request.header,
            response
        );
        response
    }
}

impl fmt::Display for CommitUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "segmentCommitUpload[{}, location=`{}`]",
            self.request.header, self.request.segment_location
        )
    }
}
