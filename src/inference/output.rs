//! Result rows and submission files

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::errors::Result;

pub const SUBMISSION_FILE: &str = "submission.csv";
pub const DECODED_FILE: &str = "decoded.csv";

/// Predicted answer for one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub answer: String,
}

/// Greedy-decoded diagnostic text for one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoded {
    pub id: String,
    pub decoded: String,
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "wrote csv");
    Ok(())
}

/// `id,answer` rows in input order
pub fn write_predictions(path: &Path, predictions: &[Prediction]) -> Result<()> {
    write_rows(path, predictions)
}

/// `id,decoded` rows in input order
pub fn write_decoded(path: &Path, decoded: &[Decoded]) -> Result<()> {
    write_rows(path, decoded)
}

pub fn read_predictions(path: &Path) -> Result<Vec<Prediction>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}
