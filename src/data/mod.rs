//! Dataset side of the pipeline
//!
//! Loading and parsing of exam records, prompt formatting, tokenization
//! with label construction, and export for the external trainer.

pub mod builder;
pub mod example;
pub mod export;
pub mod formatter;
pub mod labels;
pub mod literal;
pub mod record;
pub mod template;

pub use builder::{format_records, DatasetBuilder, DatasetItem, FormatOutput, MultipleChoiceDataset};
pub use example::{ChatExample, Message, Role};
pub use formatter::{render_choices, DatasetMode, ExampleFormatter, TemplateVariant};
pub use labels::{Collator, LabelMode, PaddingSide, TokenizedExample, IGNORE_INDEX};
pub use record::{load_csv, LoadReport, RawRecord, MAX_CHOICES};
