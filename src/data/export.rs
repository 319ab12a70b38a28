//! Hand-off files for the external trainer
//!
//! Token sequences go to JSONL, one example per line. A manifest next to
//! them records the fine-tuning setup the sequences were built for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::config::{PipelineConfig, TrainingConfig};
use crate::data::labels::{LabelMode, PaddingSide};
use crate::errors::Result;

pub const MANIFEST_FILE: &str = "trainer_manifest.json";

/// Write serializable items as JSON lines, returning the count
pub fn write_jsonl<'a, T, I>(path: &Path, items: I) -> Result<usize>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    let mut count = 0;
    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    writer.flush()?;
    info!(path = %path.display(), count, "wrote jsonl");
    Ok(count)
}

/// Read JSON lines back, skipping blank lines
pub fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let contents = std::fs::read_to_string(path)?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| Ok(serde_json::from_str(line)?))
        .collect()
}

/// One exported split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitInfo {
    pub path: PathBuf,
    pub examples: usize,
    pub skipped: usize,
}

/// Everything the trainer needs besides the sequences themselves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerManifest {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub model_path: String,
    pub max_seq_length: usize,
    pub response_template: String,
    pub padding_side: PaddingSide,
    pub label_mode: LabelMode,
    pub pad_token_id: u32,
    pub seed: u64,
    pub rag_enabled: bool,
    pub train: SplitInfo,
    pub eval: SplitInfo,
    pub training: TrainingConfig,
}

impl TrainerManifest {
    pub fn new(config: &PipelineConfig, pad_token_id: u32, train: SplitInfo, eval: SplitInfo) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            model_path: config.model.model_path.clone(),
            max_seq_length: config.max_length,
            response_template: config.model.response_template.clone(),
            padding_side: config.model.padding_side,
            label_mode: config.model.label_mode,
            pad_token_id,
            seed: config.model.seed,
            rag_enabled: config.rag.enabled,
            train,
            eval,
            training: config.training.clone(),
        }
    }

    /// Write as pretty JSON into `dir`
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        info!(path = %path.display(), run_id = %self.run_id, "wrote trainer manifest");
        Ok(path)
    }
}
