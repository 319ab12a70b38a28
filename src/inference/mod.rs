//! Inference over evaluation examples
//!
//! Strategies tokenize each conversation with the generation prompt
//! appended and run a single forward pass per record.

pub mod answer;
pub mod metrics;
pub mod model;
pub mod output;
pub mod scoring;
pub mod strategies;

pub use metrics::{accuracy, AccuracyReport};
pub use model::{CausalLm, Qwen2Lm};
pub use output::{Decoded, Prediction};
pub use scoring::{CandidateTokens, ChoiceScore};
pub use strategies::{preview, InferenceEngine, ScoreOutput, Strategy};
