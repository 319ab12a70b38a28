//! Label construction and batch collation for causal fine-tuning
//!
//! Positions equal to the pad id are replaced by [`IGNORE_INDEX`] so the
//! loss skips them. All transforms return new sequences.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Label value ignored by the loss
pub const IGNORE_INDEX: i64 = -100;

/// How labels are derived from input ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    /// labels = input_ids (the trainer shifts internally)
    Copy,
    /// labels shifted left by one, final position set to the pad id
    Shift,
}

/// Which end of a sequence receives padding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddingSide {
    Left,
    Right,
}

/// One tokenized training example
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedExample {
    pub id: String,
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub labels: Vec<i64>,
}

fn mask_pad(ids: impl Iterator<Item = u32>, pad_id: u32) -> Vec<i64> {
    ids.map(|t| if t == pad_id { IGNORE_INDEX } else { t as i64 })
        .collect()
}

/// Build labels for `input_ids` according to `mode`
pub fn build_labels(input_ids: &[u32], pad_id: u32, mode: LabelMode) -> Vec<i64> {
    match mode {
        LabelMode::Copy => mask_pad(input_ids.iter().copied(), pad_id),
        LabelMode::Shift => {
            if input_ids.is_empty() {
                return Vec::new();
            }
            let shifted = input_ids[1..]
                .iter()
                .copied()
                .chain(std::iter::once(pad_id));
            mask_pad(shifted, pad_id)
        }
    }
}

/// Find the start of the last occurrence of `needle` in `haystack`
fn rfind_subsequence(haystack: &[u32], needle: &[u32]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| haystack[i..i + needle.len()] == *needle)
}

/// Mask every label up to and including the response template
///
/// Only the assistant completion contributes to the loss. When the template
/// does not occur the whole example is masked.
pub fn mask_completion_only(
    input_ids: &[u32],
    labels: &[i64],
    response_template: &[u32],
) -> Vec<i64> {
    let mut masked = labels.to_vec();
    match rfind_subsequence(input_ids, response_template) {
        Some(start) => {
            let end = (start + response_template.len()).min(masked.len());
            masked[..end].iter_mut().for_each(|l| *l = IGNORE_INDEX);
        }
        None => {
            warn!("response template not found; example fully masked");
            masked.iter_mut().for_each(|l| *l = IGNORE_INDEX);
        }
    }
    masked
}

/// A padded batch, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub input_ids: Vec<Vec<u32>>,
    pub attention_mask: Vec<Vec<u32>>,
    pub labels: Vec<Vec<i64>>,
}

/// Pad examples to the longest sequence in the batch
#[derive(Debug, Clone)]
pub struct Collator {
    pub pad_id: u32,
    pub padding_side: PaddingSide,
}

impl Collator {
    pub fn new(pad_id: u32, padding_side: PaddingSide) -> Self {
        Self { pad_id, padding_side }
    }

    pub fn collate(&self, examples: &[TokenizedExample]) -> Batch {
        let width = examples.iter().map(|e| e.input_ids.len()).max().unwrap_or(0);
        let mut batch = Batch {
            input_ids: Vec::with_capacity(examples.len()),
            attention_mask: Vec::with_capacity(examples.len()),
            labels: Vec::with_capacity(examples.len()),
        };

        for example in examples {
            batch.input_ids.push(self.pad(&example.input_ids, width, self.pad_id));
            batch.attention_mask.push(self.pad(&example.attention_mask, width, 0));
            batch.labels.push(self.pad(&example.labels, width, IGNORE_INDEX));
        }

        batch
    }

    fn pad<T: Copy>(&self, values: &[T], width: usize, fill: T) -> Vec<T> {
        let padding = std::iter::repeat(fill).take(width.saturating_sub(values.len()));
        match self.padding_side {
            PaddingSide::Right => values.iter().copied().chain(padding).collect(),
            PaddingSide::Left => padding.chain(values.iter().copied()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_sets_last_to_pad_then_masks() {
        let labels = build_labels(&[5, 6, 7, 0], 0, LabelMode::Shift);
        assert_eq!(labels, vec![6, 7, -100, -100]);
    }

    #[test]
    fn test_copy_masks_pad_only() {
        let labels = build_labels(&[5, 6, 7, 0], 0, LabelMode::Copy);
        assert_eq!(labels, vec![5, 6, 7, -100]);
    }

    #[test]
    fn test_shift_empty_and_single() {
        assert!(build_labels(&[], 0, LabelMode::Shift).is_empty());
        assert_eq!(build_labels(&[9], 0, LabelMode::Shift), vec![-100]);
    }

    #[test]
    fn test_completion_only_uses_last_template_occurrence() {
        let ids = [1, 8, 9, 2, 8, 9, 4, 3];
        let labels = build_labels(&ids, 0, LabelMode::Copy);
        let masked = mask_completion_only(&ids, &labels, &[8, 9]);
        assert_eq!(masked, vec![-100, -100, -100, -100, -100, -100, 4, 3]);
    }

    #[test]
    fn test_completion_only_without_template_masks_all() {
        let ids = [1, 2, 3];
        let masked = mask_completion_only(&ids, &[1, 2, 3], &[7]);
        assert!(masked.iter().all(|&l| l == IGNORE_INDEX));
    }

    #[test]
    fn test_collate_right_and_left() {
        let a = TokenizedExample {
            id: "a".into(),
            input_ids: vec![1, 2, 3],
            attention_mask: vec![1, 1, 1],
            labels: vec![1, 2, 3],
        };
        let b = TokenizedExample {
            id: "b".into(),
            input_ids: vec![4],
            attention_mask: vec![1],
            labels: vec![4],
        };

        let right = Collator::new(0, PaddingSide::Right).collate(&[a.clone(), b.clone()]);
        assert_eq!(right.input_ids[1], vec![4, 0, 0]);
        assert_eq!(right.attention_mask[1], vec![1, 0, 0]);
        assert_eq!(right.labels[1], vec![4, -100, -100]);

        let left = Collator::new(0, PaddingSide::Left).collate(&[a, b]);
        assert_eq!(left.input_ids[1], vec![0, 0, 4]);
        assert_eq!(left.input_ids[0], vec![1, 2, 3]);
    }
}
