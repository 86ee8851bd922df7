use thiserror::Error;

pub type Result<T> = std::result::Result<T, SdkError>;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("HTTP error: {0}")]
    Http(#[from] stakebridge_http::HttpError),

    #[error("Business API error: {0}")]
    Api(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
