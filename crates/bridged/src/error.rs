use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] stakebridge_http::HttpError),

    #[error("Client error: {0}")]
    Sdk(#[from] stakebridge_sdk::SdkError),
}
