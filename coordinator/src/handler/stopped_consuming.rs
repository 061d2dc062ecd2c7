use std::collections::HashMap;
use std::fmt;

use log::trace;
use metastore::SegmentStore;
use model::request::StoppedConsumingRequest;
use model::CompletionResponse;

use super::{parse_header, PARAM_REASON};
use crate::completion::SegmentCompletionManager;
use crate::error::ServiceError;

/// `/segmentStoppedConsuming`: a replica hit an unrecoverable local error
/// and wants out of committer candidacy. The reason is free text.
#[derive(Debug)]
pub(crate) struct StoppedConsuming {
    request: StoppedConsumingRequest,
}

impl StoppedConsuming {
    pub(crate) fn parse_params(params: &HashMap<String, String>) -> Result<Self, ServiceError> {
        let header = parse_header(params)?;
        let reason = params.get(PARAM_REASON).cloned().unwrap_or_default();
        Ok(Self {
            request: StoppedConsumingRequest { header, reason },
        })
    }

    pub(crate) async fn apply<S>(
        &self,
        manager: &SegmentCompletionManager<S>,
    ) -> CompletionResponse
    where
        S: SegmentStore,
    {
        let response = manager.segment_stopped_consuming(&self.request).await;
        trace!(
            "segmentStoppedConsuming [{}] -> {}",
            self.request.header,
            response
        );
        response
    }
}

impl fmt::Display for StoppedConsuming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "segmentStoppedConsuming[{}, reason=`{}`]",
            self.request.header, self.request.reason
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::params;
    use super::*;

    #[test]
    fn test_reason_is_optional_free_text() {
        let with_reason = params(&[
            ("name", "orders__0__0"),
            ("instance", "server-1"),
            ("offset", "100"),
            ("reason", "disk failure"),
        ]);
        let handler = StoppedConsuming::parse_params(&with_reason).unwrap();
        assert_eq!("disk failure", handler.request.reason);

        let without_reason = params(&[
            ("name", "orders__0__0"),
            ("instance", "server-1"),
            ("offset", "100"),
        ]);
        let handler = StoppedConsuming::parse_params(&without_reason).unwrap();
        assert_eq!("", handler.request.reason);
    }
}
