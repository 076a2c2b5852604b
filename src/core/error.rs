use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LintError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Private key required: {0}")]
    MissingPrivateKey(String),
    #[error("Crypto error: {0}")]
    CryptoError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl LintError {
    pub fn is_not_found(&self) -> bool {
        match self {
            LintError::NotFound(_) => true,
            LintError::IoError(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
