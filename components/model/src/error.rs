use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SegmentError {
    #[error("Malformed segment name `{0}`")]
    MalformedName(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ReportError {
    #[error("Unknown stop reason `{0}`")]
    UnknownStopReason(String),
}
