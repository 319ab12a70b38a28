// Query rewriter - condense a record into a short retrieval query
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::t5::{self, T5ForConditionalGeneration};
use tokenizers::Tokenizer;
use tracing::{debug, warn};

use crate::data::formatter::render_choices;
use crate::data::record::RawRecord;
use crate::errors::{PipelineError, Result};
use crate::hub::ModelFiles;

/// Decoding settings for the rewrite call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub min_length: usize,
    pub max_new_tokens: usize,
    /// Sampling pool size, as in the default sampling setup of seq2seq generation
    pub top_k: usize,
    pub temperature: f64,
    pub seed: u64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            min_length: 10,
            max_new_tokens: 64,
            top_k: 50,
            temperature: 1.0,
            seed: 42,
        }
    }
}

/// Sequence-to-sequence text generation
pub trait QueryGenerator: Send {
    fn generate(&mut self, prompt: &str, options: &GenerationOptions) -> Result<String>;
}

/// A rewritten query and how it was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenQuery {
    pub text: String,
    /// True when generation produced nothing usable
    pub fallback: bool,
}

/// Builds retrieval queries from records
pub struct QueryRewriter {
    generator: Box<dyn QueryGenerator>,
    prefix: String,
    fallback_chars: usize,
    options: GenerationOptions,
}

impl QueryRewriter {
    pub fn new(generator: Box<dyn QueryGenerator>, prefix: impl Into<String>, fallback_chars: usize) -> Self {
        Self {
            generator,
            prefix: prefix.into(),
            fallback_chars,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Prefix followed by paragraph, question and rendered choices
    pub fn build_input(&self, record: &RawRecord) -> String {
        format!(
            "{}{}\n{}\n{}",
            self.prefix,
            record.paragraph,
            record.question,
            render_choices(&record.choices)
        )
    }

    /// First sentence of the generated text, or a truncated paragraph
    pub fn rewrite(&mut self, record: &RawRecord) -> RewrittenQuery {
        let input = self.build_input(record);
        let generated = match self.generator.generate(&input, &self.options) {
            Ok(text) => text,
            Err(e) => {
                warn!(id = %record.id, error = %e, "query generation failed");
                String::new()
            }
        };

        match first_sentence(generated.trim()) {
            Some(sentence) => {
                debug!(id = %record.id, query = %sentence, "rewrote query");
                RewrittenQuery {
                    text: sentence.to_string(),
                    fallback: false,
                }
            }
            None => {
                warn!(id = %record.id, "empty rewrite, falling back to paragraph");
                RewrittenQuery {
                    text: truncate_chars(record.paragraph.trim(), self.fallback_chars).to_string(),
                    fallback: true,
                }
            }
        }
    }
}

/// First sentence that contains a letter or digit, terminator included
///
/// A terminator only ends a sentence when followed by whitespace or the end
/// of the text, so decimals such as `3.5` stay intact. Punctuation-only
/// sentences such as a leading `...` are skipped.
pub fn first_sentence(text: &str) -> Option<&str> {
    let has_content = |s: &str| s.chars().any(char::is_alphanumeric);
    let text = text.trim();
    let mut start = 0;

    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '?' | '!' | '。') {
            let at_boundary = match chars.peek() {
                None => true,
                Some((_, next)) => next.is_whitespace(),
            };
            if at_boundary {
                let end = i + c.len_utf8();
                let sentence = text[start..end].trim();
                if has_content(sentence) {
                    return Some(sentence);
                }
                start = end;
            }
        }
    }

    let rest = text[start..].trim();
    if has_content(rest) {
        Some(rest)
    } else {
        None
    }
}

/// Char-boundary safe prefix of at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// T5 conditional generation on Candle
pub struct T5Generator {
    model: T5ForConditionalGeneration,
    tokenizer: Tokenizer,
    config: t5::Config,
    device: Device,
}

impl T5Generator {
    pub fn load(model_id: &str) -> Result<Self> {
        let device = Device::cuda_if_available(0)?;
        let files = ModelFiles::resolve(model_id)?;

        let config: t5::Config = files.json("config.json")?;
        let tokenizer = Tokenizer::from_file(files.get("tokenizer.json")?)?;
        let weights = files.weights()?;

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weights, DType::F32, &device)? };
        let model = T5ForConditionalGeneration::load(vb, &config)?;

        Ok(Self {
            model,
            tokenizer,
            config,
            device,
        })
    }
}

impl QueryGenerator for T5Generator {
    fn generate(&mut self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        self.model.clear_kv_cache();

        let input_ids = self.tokenizer.encode(prompt, true)?.get_ids().to_vec();
        let input = Tensor::new(input_ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let encoder_output = self.model.encode(&input)?;

        let start = self
            .config
            .decoder_start_token_id
            .unwrap_or(self.config.pad_token_id) as u32;
        let eos = self.config.eos_token_id as u32;

        let mut logits_processor = LogitsProcessor::from_sampling(
            options.seed,
            Sampling::TopK {
                k: options.top_k,
                temperature: options.temperature,
            },
        );

        let mut output = vec![start];
        for index in 0..options.max_new_tokens {
            let decoder_ids = if index == 0 || !self.config.use_cache {
                Tensor::new(output.as_slice(), &self.device)?.unsqueeze(0)?
            } else {
                let last = output[output.len() - 1];
                Tensor::new(&[last], &self.device)?.unsqueeze(0)?
            };

            let logits = self
                .model
                .decode(&decoder_ids, &encoder_output)?
                .squeeze(0)?
                .to_dtype(DType::F32)?;

            let generated = output.len() - 1;
            let logits = if generated < options.min_length {
                suppress_token(&logits, eos)?
            } else {
                logits
            };

            let next = logits_processor.sample(&logits)?;
            if next == eos {
                break;
            }
            output.push(next);
        }

        self.tokenizer
            .decode(&output[1..], true)
            .map_err(|e| PipelineError::Tokenization(e.to_string()))
    }
}

/// Set one logit to negative infinity
fn suppress_token(logits: &Tensor, token: u32) -> Result<Tensor> {
    let mut values = logits.to_vec1::<f32>()?;
    if let Some(v) = values.get_mut(token as usize) {
        *v = f32::NEG_INFINITY;
    }
    Ok(Tensor::new(values.as_slice(), logits.device())?)
}
