//! Error types for the collector

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Node returned an error for {method}: {message}")]
    Remote { method: String, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot retrieve chain tip from {url}: {reason}")]
    TipUnavailable { url: String, reason: String },

    #[error("Series store has no recorded height; run `init-history` first")]
    NotInitialised,

    #[error("No headers up to tip {tip} could be fetched; stored history kept")]
    NoHeaders { tip: u64 },

    #[error("{what} {value} is outside the store's integer range")]
    OutOfRange { what: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, CollectorError>;

impl CollectorError {
    /// Transport-level failures worth another attempt. Remote errors are
    /// logical failures and never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            CollectorError::Transport(_) => true,
            CollectorError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
