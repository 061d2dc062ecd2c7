use std::collections::HashMap;

use model::request::ReportHeader;
use model::{Offset, ReplicaId, SegmentName};

use crate::error::ServiceError;

pub(crate) mod cmd;
pub(crate) mod commit_end;
pub(crate) mod commit_start;
pub(crate) mod commit_upload;
pub(crate) mod consumed;
pub(crate) mod stopped_consuming;

pub(crate) use cmd::Command;

/// Query parameters shared by every completion endpoint.
pub(crate) const PARAM_SEGMENT_NAME: &str = "name";
pub(crate) const PARAM_INSTANCE_ID: &str = "instance";
pub(crate) const PARAM_OFFSET: &str = "offset";
pub(crate) const PARAM_REASON: &str = "reason";
pub(crate) const PARAM_LOCATION: &str = "location";
pub(crate) const PARAM_ROW_COUNT: &str = "rows";
pub(crate) const PARAM_SIZE_BYTES: &str = "sizeBytes";

pub(crate) fn require<'a>(
    params: &'a HashMap<String, String>,
    key: &'static str,
) -> Result<&'a str, ServiceError> {
    params
        .get(key)
        .map(String::as_str)
        .ok_or(ServiceError::MissingParameter(key))
}

pub(crate) fn parse_header(params: &HashMap<String, String>) -> Result<ReportHeader, ServiceError> {
    let segment_name = require(params, PARAM_SEGMENT_NAME)?
        .parse::<SegmentName>()
        .map_err(|_| ServiceError::InvalidParameter(PARAM_SEGMENT_NAME))?;
    let replica_id = ReplicaId::from(require(params, PARAM_INSTANCE_ID)?);
    let offset = require(params, PARAM_OFFSET)?
        .parse::<u64>()
        .map(Offset::new)
        .map_err(|_| ServiceError::InvalidParameter(PARAM_OFFSET))?;
    Ok(ReportHeader {
        segment_name,
        replica_id,
        offset,
    })
}
