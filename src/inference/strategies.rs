//! Per-record inference strategies
//!
//! Every strategy walks the evaluation examples sequentially and returns
//! results in input order, so position `i` of the output belongs to example
//! `i` of the input.

use candle_core::IndexOp;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{debug, info};

use crate::data::example::ChatExample;
use crate::errors::{PipelineError, Result};
use crate::inference::answer::extract_answer;
use crate::inference::model::CausalLm;
use crate::inference::output::{Decoded, Prediction};
use crate::inference::scoring::{greedy_ids, score_choices, CandidateTokens};
use crate::progress::record_bar;
use crate::tokenizer::ChatTokenizer;

/// Which inference path to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Sample one token and extract the answer from it
    Generate,
    /// Restricted softmax over the answer tokens
    Score,
    /// Print the tokenized prompt only
    Preview,
}

/// Predictions and greedy-decoded diagnostics, parallel to the input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreOutput {
    pub predictions: Vec<Prediction>,
    pub decoded: Vec<Decoded>,
}

/// Runs strategies against one loaded model
pub struct InferenceEngine<'a> {
    model: Box<dyn CausalLm>,
    tokenizer: &'a ChatTokenizer,
    sampler: LogitsProcessor,
    show_progress: bool,
}

impl<'a> InferenceEngine<'a> {
    /// `top_k` and `seed` configure the generation sampler
    pub fn new(model: Box<dyn CausalLm>, tokenizer: &'a ChatTokenizer, top_k: usize, seed: u64) -> Self {
        Self {
            model,
            tokenizer,
            sampler: LogitsProcessor::from_sampling(seed, Sampling::TopK { k: top_k, temperature: 1.0 }),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Sample a single new token and extract the answer from it
    pub fn generate(&mut self, examples: &[ChatExample]) -> Result<Vec<Prediction>> {
        let pb = record_bar(examples.len(), "Generating", self.show_progress);
        let mut predictions = Vec::with_capacity(examples.len());

        for example in examples {
            // rendered with the generation prompt so the model continues the assistant turn
            let ids = prompt_ids(self.tokenizer, example)?;
            let logits = self.model.logits(&ids)?;
            let last = logits.i(ids.len() - 1)?;
            let token = self.sampler.sample(&last)?;
            let text = self.tokenizer.decode(&[token], true)?;

            let answer = extract_answer(&text);
            debug!(id = %example.id, generated = %text, answer = %answer, "generated");
            predictions.push(Prediction {
                id: example.id.clone(),
                answer,
            });
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!(records = predictions.len(), "generation finished");
        Ok(predictions)
    }

    /// Greedy decode for diagnostics plus closed-set choice scoring
    pub fn score(&mut self, examples: &[ChatExample]) -> Result<ScoreOutput> {
        let pb = record_bar(examples.len(), "Scoring", self.show_progress);
        let mut output = ScoreOutput::default();

        for example in examples {
            let len_choices = example.len_choices.ok_or_else(|| PipelineError::MalformedRecord {
                id: example.id.clone(),
                reason: "evaluation example without len_choices".to_string(),
            })?;
            let candidates = CandidateTokens::resolve(self.tokenizer, len_choices)?;

            let ids = prompt_ids(self.tokenizer, example)?;
            let logits = self.model.logits(&ids)?;
            let decoded = self.tokenizer.decode(&greedy_ids(&logits)?, false)?;
            let score = score_choices(&logits, &candidates)?;

            debug!(id = %example.id, probs = ?score.probs, answer = score.answer, "scored");
            output.predictions.push(Prediction {
                id: example.id.clone(),
                answer: score.answer.to_string(),
            });
            output.decoded.push(Decoded {
                id: example.id.clone(),
                decoded,
            });
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!(records = output.predictions.len(), "scoring finished");
        Ok(output)
    }
}

/// Conversation with the generation prompt appended, as token ids
fn prompt_ids(tokenizer: &ChatTokenizer, example: &ChatExample) -> Result<Vec<u32>> {
    let ids = tokenizer.encode_chat(&example.messages, true)?;
    if ids.is_empty() {
        return Err(PipelineError::Tokenization(format!(
            "record {} encoded to no tokens",
            example.id
        )));
    }
    Ok(ids)
}

/// Write each decoded prompt to `out`; returns the number written
///
/// Uses the same tokenization as scoring but needs no model.
pub fn preview<W: Write>(tokenizer: &ChatTokenizer, examples: &[ChatExample], out: &mut W) -> Result<usize> {
    for example in examples {
        let ids = prompt_ids(tokenizer, example)?;
        let text = tokenizer.decode(&ids, false)?;
        writeln!(out, "{}", text)?;
    }
    Ok(examples.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::example::{Message, Role};
    use crate::tokenizer::tests::test_tokenizer;
    use candle_core::{Device, Tensor};

    const VOCAB: usize = 21;

    /// Every position strongly prefers `favourite`
    struct FakeLm {
        favourite: u32,
    }

    impl CausalLm for FakeLm {
        fn logits(&mut self, input_ids: &[u32]) -> Result<Tensor> {
            let mut flat = vec![0f32; input_ids.len() * VOCAB];
            for row in 0..input_ids.len() {
                flat[row * VOCAB + self.favourite as usize] = 50.0;
            }
            Ok(Tensor::from_vec(flat, (input_ids.len(), VOCAB), &Device::Cpu)?)
        }
    }

    fn example(id: &str, len_choices: Option<usize>) -> ChatExample {
        ChatExample {
            id: id.to_string(),
            messages: vec![
                Message::new(Role::System, "지문"),
                Message::new(Role::User, "질문 a b"),
            ],
            label: None,
            len_choices,
            augmented: false,
        }
    }

    #[test]
    fn test_score_returns_parallel_streams() {
        let tok = test_tokenizer();
        // id 9 is the token "3"
        let mut engine = InferenceEngine::new(Box::new(FakeLm { favourite: 9 }), &tok, 10, 42);
        let out = engine
            .score(&[example("q1", Some(4)), example("q2", Some(5))])
            .unwrap();

        assert_eq!(out.predictions.len(), 2);
        assert_eq!(out.decoded.len(), 2);
        assert_eq!(out.predictions[0], Prediction { id: "q1".into(), answer: "3".into() });
        assert_eq!(out.decoded[1].id, "q2");
        assert!(out.decoded[0].decoded.starts_with('3'));
    }

    #[test]
    fn test_score_rejects_six_choices() {
        let tok = test_tokenizer();
        let mut engine = InferenceEngine::new(Box::new(FakeLm { favourite: 9 }), &tok, 10, 42);
        assert!(matches!(
            engine.score(&[example("q1", Some(6))]),
            Err(PipelineError::UnsupportedChoiceCount { count: 6, .. })
        ));
    }

    #[test]
    fn test_score_outside_choice_range_is_not_predicted() {
        let tok = test_tokenizer();
        // model prefers "5" but only two choices exist
        let mut engine = InferenceEngine::new(Box::new(FakeLm { favourite: 11 }), &tok, 10, 42);
        let out = engine.score(&[example("q1", Some(2))]).unwrap();
        assert_eq!(out.predictions[0].answer, "1");
    }

    #[test]
    fn test_generate_extracts_digit() {
        let tok = test_tokenizer();
        let mut engine = InferenceEngine::new(Box::new(FakeLm { favourite: 8 }), &tok, 10, 42);
        let predictions = engine.generate(&[example("q1", Some(4))]).unwrap();
        assert_eq!(predictions[0].answer, "2");
    }

    /// Records every sequence it is asked to score
    struct RecordingLm {
        seen: std::sync::Arc<std::sync::Mutex<Vec<Vec<u32>>>>,
    }

    impl CausalLm for RecordingLm {
        fn logits(&mut self, input_ids: &[u32]) -> Result<Tensor> {
            self.seen.lock().unwrap().push(input_ids.to_vec());
            FakeLm { favourite: 7 }.logits(input_ids)
        }
    }

    #[test]
    fn test_generate_prompt_ends_with_assistant_turn() {
        let tok = test_tokenizer();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let lm = RecordingLm { seen: seen.clone() };
        let mut engine = InferenceEngine::new(Box::new(lm), &tok, 10, 42);
        engine.generate(&[example("q1", Some(2))]).unwrap();

        let seen = seen.lock().unwrap();
        // "<s> assistant" opens the turn the model completes
        assert_eq!(seen[0][seen[0].len() - 2..], [2, 6]);
    }

    #[test]
    fn test_preview_writes_prompt() {
        let tok = test_tokenizer();
        let mut out = Vec::new();
        assert_eq!(preview(&tok, &[example("q1", None)], &mut out).unwrap(), 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("user"));
        assert!(text.trim_end().ends_with("assistant"));
    }
}
