//! Error types for the kmcqa pipeline
//!
//! One taxonomy for every stage: row parsing, configuration, retrieval,
//! tokenization and scoring. Record-level variants are isolated by the
//! dataset loader; the rest propagate to the binary.

use thiserror::Error;

/// Main error type for dataset building and inference
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A row whose problem structure could not be parsed
    #[error("Malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },

    /// Required configuration keys absent from the config file
    #[error("Missing configuration keys: {}", .0.join(", "))]
    MissingConfigKeys(Vec<String>),

    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Embedding or vector search failure
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Choice count outside the single-digit candidate map
    #[error("Unsupported choice count: {count} choices (at most {max} can be scored)")]
    UnsupportedChoiceCount { count: usize, max: usize },

    /// Tokenizer or vocabulary lookup failure
    #[error("Tokenization error: {0}")]
    Tokenization(String),

    /// Prompt or chat template rendering failure
    #[error("Template error: {0}")]
    Template(String),

    /// Model loading or forward pass failure
    #[error("Model error: {0}")]
    Model(String),

    /// Delimited file errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation gave up after repeated transient failures
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<candle_core::Error> for PipelineError {
    fn from(err: candle_core::Error) -> Self {
        PipelineError::Model(err.to_string())
    }
}

impl From<tokenizers::Error> for PipelineError {
    fn from(err: tokenizers::Error) -> Self {
        PipelineError::Tokenization(err.to_string())
    }
}

impl From<minijinja::Error> for PipelineError {
    fn from(err: minijinja::Error) -> Self {
        PipelineError::Template(err.to_string())
    }
}

impl PipelineError {
    /// Errors that are confined to a single input row
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            PipelineError::MalformedRecord { .. }
                | PipelineError::UnsupportedChoiceCount { .. }
                | PipelineError::Template(_)
        )
    }
}
