use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("moderation provider unavailable: {0}")]
    ModerationUnavailable(String),

    #[error("malformed moderation response: {0}")]
    ModerationParseError(String),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("persistence facade error: {0}")]
    Facade(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
