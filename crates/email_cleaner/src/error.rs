use thiserror::Error;

#[derive(Debug, Error)]
pub enum CleanerError {
    #[error("Invalid pattern in family '{family}': {pattern}: {source}")]
    InvalidPattern {
        family: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid validation rule: {0}")]
    InvalidRule(String),
}
