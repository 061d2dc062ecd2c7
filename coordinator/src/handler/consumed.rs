use std::collections::HashMap;
use std::fmt;

use log::trace;
use metastore::SegmentStore;
use model::request::ConsumedRequest;
use model::{CompletionResponse, StopReason};

use super::{parse_header, require, PARAM_REASON};
use crate::completion::SegmentCompletionManager;
use crate::error::ServiceError;

/// `/segmentConsumed`: a replica reached its local flush condition.
#[derive(Debug)]
pub(crate) struct Consumed {
    request: ConsumedRequest,
}

impl Consumed {
    pub(crate) fn parse_params(params: &HashMap<String, String>) -> Result<Self, ServiceError> {
        let header = parse_header(params)?;
        let reason = StopReason::parse(require(params, PARAM_REASON)?)
            .map_err(|_| ServiceError::InvalidParameter(PARAM_REASON))?;
        Ok(Self {
            request: ConsumedRequest { header, reason },
        })
    }

    pub(crate) async fn apply<S>(
        &self,
        manager: &SegmentCompletionManager<S>,
    ) -> CompletionResponse
    where
        S: SegmentStore,
    {
        let response = manager.segment_consumed(&self.request).await;
        trace!("segmentConsumed [{}] -> {}", self.request.header, response);
        response
    }
}

impl fmt::Display for Consumed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "segmentConsumed[{}, reason={}]",
            self.request.header, self.request.reason
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::params;
    use super::*;

    #[test]
    fn test_parse_params() {
        let params = params(&[
            ("name", "orders__0__0"),
            ("instance", "server-1"),
            ("offset", "100"),
            ("reason", "ROW_LIMIT"),
        ]);
        let handler = Consumed::parse_params(&params).unwrap();
        assert_eq!(StopReason::RowLimit, handler.request.reason);
        assert_eq!(
            "segmentConsumed[segment=orders__0__0, replica=server-1, offset=100, reason=ROW_LIMIT]",
            handler.to_string()
        );
    }

    #[test]
    fn test_unknown_reason_rejected() {
        let params = params(&[
            ("name", "orders__0__0"),
            ("instance", "server-1"),
            ("offset", "100"),
            ("reason", "TIRED"),
        ]);
        assert_eq!(
            Err(ServiceError::InvalidParameter("reason")),
            Consumed::parse_params(&params).map(|_| ())
        );
    }
}
