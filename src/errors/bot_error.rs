//! Custom error types for the bot

use alloy::primitives::Address;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
        retry_count: u32,
    },

    #[error("Contract interaction failed: {contract} - {message}")]
    Contract {
        contract: Address,
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Data parsing error: {context}")]
    DataParsing {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// Fatal; raised at construction or seed time and never retried.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Fixed-point arithmetic error: {0}")]
    Arithmetic(String),

    #[error("Engine is {state}, cannot {operation}")]
    InvalidState {
        state: String,
        operation: &'static str,
    },
}

pub type BotResult<T> = Result<T, BotError>;

impl BotError {
    pub fn parsing(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        BotError::DataParsing {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn network(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        BotError::Network {
            message: message.into(),
            source: Some(source.into()),
            retry_count: 0,
        }
    }

    /// Whether the failure is worth retrying at the point of detection.
    pub fn is_transient(&self) -> bool {
        matches!(self, BotError::Network { .. } | BotError::Contract { .. })
    }
}
