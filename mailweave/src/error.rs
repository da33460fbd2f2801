//! Error types for the ingestion core
//!
//! Decode, validation and resolution failures degrade per message and are
//! logged rather than returned to a batch. The variants below surface only
//! where a caller has to act: storage, configuration and lookups.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailweaveError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, MailweaveError>;

// Serialize as a plain string so reports can carry errors as JSON.
impl Serialize for MailweaveError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<r2d2::Error> for MailweaveError {
    fn from(e: r2d2::Error) -> Self {
        MailweaveError::Database(e.to_string())
    }
}

impl From<rusqlite::Error> for MailweaveError {
    fn from(e: rusqlite::Error) -> Self {
        MailweaveError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for MailweaveError {
    fn from(e: serde_json::Error) -> Self {
        MailweaveError::Database(format!("JSON column: {}", e))
    }
}

impl From<toml::de::Error> for MailweaveError {
    fn from(e: toml::de::Error) -> Self {
        MailweaveError::Config(e.to_string())
    }
}

impl From<std::io::Error> for MailweaveError {
    fn from(e: std::io::Error) -> Self {
        MailweaveError::Io(e.to_string())
    }
}

impl From<email_cleaner::CleanerError> for MailweaveError {
    fn from(e: email_cleaner::CleanerError) -> Self {
        MailweaveError::Config(e.to_string())
    }
}

impl From<mailparse::MailParseError> for MailweaveError {
    fn from(e: mailparse::MailParseError) -> Self {
        MailweaveError::Decode(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for MailweaveError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        MailweaveError::Database(format!("Lock poisoned: {}", e))
    }
}
