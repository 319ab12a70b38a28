//! Raw exam records and delimited-file loading
//!
//! A row carries `id`, `paragraph` and a serialized `problems` structure
//! (question, choices, optional answer, optional question_plus). Rows that
//! fail to parse are skipped and reported, never fatal.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::data::literal::{self, Literal};
use crate::errors::{PipelineError, Result};

/// Largest choice count the single-digit candidate map can score
pub const MAX_CHOICES: usize = 5;

/// One exam question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: String,
    pub paragraph: String,
    pub question: String,
    pub choices: Vec<String>,
    /// 1-based index into `choices`; absent for test data
    pub answer: Option<u32>,
    /// Supplementary context, empty when the problem has none
    pub question_plus: String,
}

impl RawRecord {
    /// Paragraph length in characters, the unit `rag_flag` is expressed in
    pub fn paragraph_len(&self) -> usize {
        self.paragraph.chars().count()
    }

    pub fn has_question_plus(&self) -> bool {
        !self.question_plus.is_empty()
    }
}

/// A row exactly as it appears in the file
#[derive(Debug, Clone, Deserialize)]
pub struct CsvRow {
    pub id: String,
    pub paragraph: String,
    pub problems: String,
    #[serde(default)]
    pub question_plus: Option<String>,
}

impl CsvRow {
    /// Validate and convert into a typed record
    pub fn into_record(self) -> Result<RawRecord> {
        let malformed = |reason: String| PipelineError::MalformedRecord {
            id: self.id.clone(),
            reason,
        };

        let problems = literal::parse(&self.problems)
            .map_err(|e| malformed(format!("unparseable problems field: {}", e)))?;
        if !matches!(problems, Literal::Dict(_)) {
            return Err(malformed("problems field is not a dictionary".to_string()));
        }

        let question = problems
            .get("question")
            .and_then(Literal::as_str)
            .ok_or_else(|| malformed("missing or non-text 'question'".to_string()))?
            .to_string();

        let choices = problems
            .get("choices")
            .and_then(Literal::as_list)
            .ok_or_else(|| malformed("missing or non-list 'choices'".to_string()))?
            .iter()
            .map(literal_to_text)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| malformed("choices must be text or numbers".to_string()))?;

        if choices.is_empty() {
            return Err(malformed("empty 'choices'".to_string()));
        }
        if choices.len() > MAX_CHOICES {
            return Err(PipelineError::UnsupportedChoiceCount {
                count: choices.len(),
                max: MAX_CHOICES,
            });
        }

        let answer = match problems.get("answer") {
            None | Some(Literal::None) => None,
            Some(value) => {
                let answer = literal_to_answer(value)
                    .ok_or_else(|| malformed(format!("invalid answer {:?}", value)))?;
                if answer == 0 || answer as usize > choices.len() {
                    return Err(malformed(format!(
                        "answer {} out of range for {} choices",
                        answer,
                        choices.len()
                    )));
                }
                Some(answer)
            }
        };

        // the nested field wins; a separate column is only a fallback
        let question_plus = match problems.get("question_plus") {
            Some(Literal::Str(s)) => s.clone(),
            Some(Literal::None) | None => self.question_plus.clone().unwrap_or_default(),
            Some(other) => literal_to_text(other).unwrap_or_default(),
        };

        Ok(RawRecord {
            id: self.id,
            paragraph: self.paragraph,
            question,
            choices,
            answer,
            question_plus,
        })
    }
}

fn literal_to_text(value: &Literal) -> Option<String> {
    match value {
        Literal::Str(s) => Some(s.clone()),
        Literal::Int(i) => Some(i.to_string()),
        Literal::Float(f) => Some(f.to_string()),
        _ => None,
    }
}

fn literal_to_answer(value: &Literal) -> Option<u32> {
    match value {
        Literal::Int(i) => u32::try_from(*i).ok(),
        Literal::Float(f) if f.fract() == 0.0 && *f >= 0.0 => Some(*f as u32),
        Literal::Str(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A row that was excluded from the pass
#[derive(Debug, Clone)]
pub struct SkippedRow {
    /// 0-based data row (header excluded)
    pub row: usize,
    pub reason: String,
}

/// Outcome of loading one file
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub records: Vec<RawRecord>,
    pub skipped: Vec<SkippedRow>,
}

impl LoadReport {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Load records from a CSV file
pub fn load_csv(path: &Path) -> Result<LoadReport> {
    let file = std::fs::File::open(path)?;
    let report = load_from_reader(file)?;
    info!(
        path = %path.display(),
        loaded = report.records.len(),
        skipped = report.skipped.len(),
        "loaded records"
    );
    Ok(report)
}

/// Load records from any CSV source, isolating malformed rows
pub fn load_from_reader<R: Read>(reader: R) -> Result<LoadReport> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let mut report = LoadReport::default();

    for (row, result) in rdr.deserialize::<CsvRow>().enumerate() {
        let parsed = match result {
            Ok(csv_row) => csv_row.into_record(),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => Err(PipelineError::Csv(e)),
        };

        match parsed {
            Ok(record) => report.records.push(record),
            Err(e) => {
                warn!(row, error = %e, "skipping row");
                report.skipped.push(SkippedRow {
                    row,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}
