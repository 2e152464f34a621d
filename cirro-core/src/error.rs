use thiserror::Error;

pub type Result<T> = std::result::Result<T, CirroError>;

#[derive(Error, Debug)]
pub enum CirroError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Origin unreachable: {0}")]
    OriginUnreachable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
