//! Error model shared by the driver library.

use thiserror::Error;

pub type TpccResult<T> = Result<T, TpccError>;

#[derive(Debug, Error)]
pub enum TpccError {
    /// Option combination rejected at startup, before any worker exists.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Backing store could not be opened, prepared or driven.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TpccError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        TpccError::InvalidConfig(msg.into())
    }
}
