use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ServiceError {
    #[error("Unsupported completion endpoint `{0}`")]
    Unsupported(String),

    #[error("Required request parameter `{0}` is missing")]
    MissingParameter(&'static str),

    #[error("Request parameter `{0}` is malformed")]
    InvalidParameter(&'static str),
}
