//! Dataset builder: records → chat examples → token sequences
//!
//! Two phases run back to back. The format phase builds one chat example
//! per record, consulting the augmenter for short paragraphs. The augmenter
//! is released as soon as that phase ends, so the retrieval models never
//! share the accelerator with tokenization or training. The tokenize phase
//! renders each conversation through the chat template and encodes the
//! whole collection in one batch.

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::data::example::ChatExample;
use crate::data::formatter::{DatasetMode, ExampleFormatter};
use crate::data::labels::{build_labels, mask_completion_only, TokenizedExample};
use crate::data::record::{RawRecord, SkippedRow};
use crate::errors::Result;
use crate::progress::record_bar;
use crate::rag::{AugmentStats, Augmenter};
use crate::tokenizer::ChatTokenizer;

/// Borrowed view of one dataset entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetItem<'a> {
    /// Training mode yields token sequences
    Tokenized(&'a TokenizedExample),
    /// Evaluation mode yields the untokenized conversation
    Chat(&'a ChatExample),
}

impl<'a> DatasetItem<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            DatasetItem::Tokenized(t) => &t.id,
            DatasetItem::Chat(c) => &c.id,
        }
    }
}

/// Indexed multiple-choice dataset
#[derive(Debug, Clone)]
pub struct MultipleChoiceDataset {
    mode: DatasetMode,
    examples: Vec<ChatExample>,
    tokenized: Vec<TokenizedExample>,
    skipped: Vec<SkippedRow>,
    augment_stats: Option<AugmentStats>,
}

impl MultipleChoiceDataset {
    pub fn mode(&self) -> DatasetMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        match self.mode {
            DatasetMode::Train => self.tokenized.len(),
            DatasetMode::Eval => self.examples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: usize) -> Option<DatasetItem<'_>> {
        match self.mode {
            DatasetMode::Train => self.tokenized.get(idx).map(DatasetItem::Tokenized),
            DatasetMode::Eval => self.examples.get(idx).map(DatasetItem::Chat),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = DatasetItem<'_>> {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Formatted conversations, in input order
    pub fn examples(&self) -> &[ChatExample] {
        &self.examples
    }

    /// Token sequences; empty in evaluation mode
    pub fn tokenized(&self) -> &[TokenizedExample] {
        &self.tokenized
    }

    /// Records dropped while formatting or tokenizing
    pub fn skipped(&self) -> &[SkippedRow] {
        &self.skipped
    }

    pub fn augment_stats(&self) -> Option<&AugmentStats> {
        self.augment_stats.as_ref()
    }
}

/// Output of the format phase
#[derive(Debug, Clone, Default)]
pub struct FormatOutput {
    pub examples: Vec<ChatExample>,
    pub skipped: Vec<SkippedRow>,
    pub augment_stats: Option<AugmentStats>,
}

/// Format every record in order, isolating per-record failures
///
/// The augmenter is released before this returns.
pub async fn format_records(
    formatter: &ExampleFormatter,
    records: &[RawRecord],
    mut augmenter: Option<Augmenter>,
    show_progress: bool,
) -> FormatOutput {
    let mut output = FormatOutput {
        examples: Vec::with_capacity(records.len()),
        ..FormatOutput::default()
    };
    let pb = record_bar(records.len(), "Formatting", show_progress);

    for (row, record) in records.iter().enumerate() {
        let hint = match augmenter.as_mut() {
            Some(aug) => aug.hint(record).await,
            None => None,
        };

        match formatter.format(record, hint.as_deref()) {
            Ok(example) => output.examples.push(example),
            Err(e) => {
                warn!(id = %record.id, error = %e, "skipping record");
                output.skipped.push(SkippedRow {
                    row,
                    reason: e.to_string(),
                });
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    output.augment_stats = augmenter.map(Augmenter::release);
    output
}

/// Builds datasets from loaded records
pub struct DatasetBuilder<'a> {
    config: &'a PipelineConfig,
    tokenizer: &'a ChatTokenizer,
    formatter: ExampleFormatter,
    show_progress: bool,
}

impl<'a> DatasetBuilder<'a> {
    pub fn new(config: &'a PipelineConfig, tokenizer: &'a ChatTokenizer, mode: DatasetMode) -> Self {
        Self {
            config,
            tokenizer,
            formatter: ExampleFormatter::new(config, mode),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn mode(&self) -> DatasetMode {
        self.formatter.mode()
    }

    /// Format every record, then tokenize in training mode
    pub async fn build(
        &self,
        records: &[RawRecord],
        augmenter: Option<Augmenter>,
    ) -> Result<MultipleChoiceDataset> {
        let FormatOutput {
            examples,
            mut skipped,
            augment_stats,
        } = self.format(records, augmenter).await;

        let tokenized = match self.mode() {
            DatasetMode::Train => {
                let (tokenized, dropped) = self.tokenize(&examples)?;
                skipped.extend(dropped);
                tokenized
            }
            DatasetMode::Eval => Vec::new(),
        };

        let dataset = MultipleChoiceDataset {
            mode: self.mode(),
            examples,
            tokenized,
            skipped,
            augment_stats,
        };
        info!(
            mode = ?dataset.mode(),
            len = dataset.len(),
            skipped = dataset.skipped().len(),
            "dataset built"
        );
        Ok(dataset)
    }

    /// Format phase; consumes and releases the augmenter
    pub async fn format(&self, records: &[RawRecord], augmenter: Option<Augmenter>) -> FormatOutput {
        format_records(&self.formatter, records, augmenter, self.show_progress).await
    }

    /// Tokenize phase: render, batch-encode, then derive labels
    pub fn tokenize(&self, examples: &[ChatExample]) -> Result<(Vec<TokenizedExample>, Vec<SkippedRow>)> {
        let mut texts = Vec::with_capacity(examples.len());
        let mut kept = Vec::with_capacity(examples.len());
        let mut skipped = Vec::new();

        for (row, example) in examples.iter().enumerate() {
            match self.tokenizer.render(&example.messages, false) {
                Ok(text) => {
                    texts.push(text);
                    kept.push(example);
                }
                Err(e) if e.is_record_level() => {
                    warn!(id = %example.id, error = %e, "chat template failed, skipping");
                    skipped.push(SkippedRow {
                        row,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let encoded = self.tokenizer.encode_batch(texts)?;
        let response_ids = self.response_template_ids()?;
        let pad_id = self.tokenizer.pad_id();
        let max_length = self.config.max_length;
        let pb = record_bar(encoded.len(), "Tokenizing", self.show_progress);

        let mut over_length = 0usize;
        let tokenized = kept
            .into_iter()
            .zip(encoded)
            .map(|(example, enc)| {
                if enc.input_ids.len() > max_length {
                    over_length += 1;
                }
                let labels = build_labels(&enc.input_ids, pad_id, self.config.model.label_mode);
                let labels = match &response_ids {
                    Some(template) => mask_completion_only(&enc.input_ids, &labels, template),
                    None => labels,
                };
                pb.inc(1);
                TokenizedExample {
                    id: example.id.clone(),
                    input_ids: enc.input_ids,
                    attention_mask: enc.attention_mask,
                    labels,
                }
            })
            .collect::<Vec<_>>();
        pb.finish_and_clear();

        if over_length > 0 {
            warn!(over_length, max_length, "examples longer than max_length are kept untruncated");
        }
        Ok((tokenized, skipped))
    }

    /// Token ids of the response template; `None` disables masking
    fn response_template_ids(&self) -> Result<Option<Vec<u32>>> {
        let template = &self.config.model.response_template;
        if template.is_empty() {
            return Ok(None);
        }
        let ids = self.tokenizer.encode_ids(template)?;
        Ok(if ids.is_empty() { None } else { Some(ids) })
    }
}
