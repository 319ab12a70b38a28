//! kmcqa - Korean multiple-choice QA pipeline
//!
//! Turns exam records into chat-formatted, optionally retrieval-augmented
//! training data, and scores answers with a fine-tuned causal LM.
//!
//! # Architecture
//!
//! - **data**: record loading, prompt formatting, dataset building, export
//! - **rag**: query rewriting and passage retrieval for short paragraphs
//! - **tokenizer**: chat template rendering and encoding
//! - **inference**: generation, choice scoring and prompt preview

pub mod cli;
pub mod config;
pub mod data;
pub mod errors;
pub mod hub;
pub mod inference;
pub mod logging;
pub mod progress;
pub mod rag;
pub mod retry;
pub mod tokenizer;

pub use config::PipelineConfig;
pub use errors::{PipelineError, Result};
