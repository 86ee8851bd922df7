use thiserror::Error;

pub type Result<T> = std::result::Result<T, HttpError>;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON decode error: {0}")]
    Decode(String),
}
