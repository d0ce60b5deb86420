//! Error types for squall.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SquallError>;

#[derive(Error, Debug)]
pub enum SquallError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SquallError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
