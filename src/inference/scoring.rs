//! Closed-set choice scoring
//!
//! The next-token logits at the final position are gathered for the tokens
//! `"1"` to `"<len_choices>"` and normalised over just those entries.

use candle_core::{Device, IndexOp, Tensor};

use crate::data::record::MAX_CHOICES;
use crate::errors::{PipelineError, Result};
use crate::tokenizer::ChatTokenizer;

/// Choice index (0-based) → answer label
pub const PRED_CHOICES: [&str; MAX_CHOICES] = ["1", "2", "3", "4", "5"];

/// Answer label for a 0-based choice index
pub fn choice_label(index: usize) -> Option<&'static str> {
    PRED_CHOICES.get(index).copied()
}

/// Vocabulary ids of the candidate answer tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTokens {
    ids: Vec<u32>,
}

impl CandidateTokens {
    /// Look up `"1"..="<len_choices>"` in the vocabulary
    pub fn resolve(tokenizer: &ChatTokenizer, len_choices: usize) -> Result<Self> {
        Self::resolve_with(len_choices, |token| tokenizer.token_id(token))
    }

    pub fn resolve_with(len_choices: usize, lookup: impl Fn(&str) -> Option<u32>) -> Result<Self> {
        if len_choices == 0 || len_choices > MAX_CHOICES {
            return Err(PipelineError::UnsupportedChoiceCount {
                count: len_choices,
                max: MAX_CHOICES,
            });
        }

        let ids = PRED_CHOICES[..len_choices]
            .iter()
            .map(|token| {
                lookup(token).ok_or_else(|| {
                    PipelineError::Tokenization(format!("answer token '{}' not in vocabulary", token))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { ids })
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Probabilities over the candidates and the chosen answer
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceScore {
    pub probs: Vec<f32>,
    pub index: usize,
    pub answer: &'static str,
}

/// Softmax over the candidate entries of a `(vocab,)` logit vector
pub fn restricted_softmax(last_logits: &Tensor, candidates: &CandidateTokens) -> Result<Vec<f32>> {
    let index = Tensor::new(candidates.ids(), last_logits.device())?;
    let gathered = last_logits.index_select(&index, 0)?;
    let probs = candle_nn::ops::softmax(&gathered, 0)?;
    Ok(probs.to_vec1::<f32>()?)
}

/// Index of the largest value; ties resolve to the lowest index
pub fn argmax_lowest(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if v <= b => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Score the candidates at the final position of `(seq_len, vocab)` logits
pub fn score_choices(logits: &Tensor, candidates: &CandidateTokens) -> Result<ChoiceScore> {
    let (seq_len, _) = logits.dims2()?;
    if seq_len == 0 {
        return Err(PipelineError::Model("empty logits".to_string()));
    }
    let last = logits.i(seq_len - 1)?;
    let probs = restricted_softmax(&last, candidates)?;

    let index = argmax_lowest(&probs)
        .ok_or_else(|| PipelineError::Model("no candidate probabilities".to_string()))?;
    let answer = choice_label(index).ok_or(PipelineError::UnsupportedChoiceCount {
        count: candidates.len(),
        max: MAX_CHOICES,
    })?;

    Ok(ChoiceScore {
        probs,
        index,
        answer,
    })
}

/// Arg-max token id at every position
pub fn greedy_ids(logits: &Tensor) -> Result<Vec<u32>> {
    Ok(logits.argmax(1)?.to_device(&Device::Cpu)?.to_vec1::<u32>()?)
}
