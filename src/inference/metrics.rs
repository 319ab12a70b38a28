//! Accuracy of predictions against labelled records

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::data::record::RawRecord;
use crate::inference::output::Prediction;

/// Accuracy summary; predictions are joined to records by `id`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    /// Predictions whose record has a known answer
    pub scored: usize,
    pub correct: usize,
    /// Predictions with no labelled record of the same id
    pub unmatched: usize,
    pub accuracy: f64,
}

pub fn accuracy(predictions: &[Prediction], records: &[RawRecord]) -> AccuracyReport {
    let answers: HashMap<&str, u32> = records
        .iter()
        .filter_map(|r| r.answer.map(|a| (r.id.as_str(), a)))
        .collect();

    let mut report = AccuracyReport::default();
    for prediction in predictions {
        match answers.get(prediction.id.as_str()) {
            Some(answer) => {
                report.scored += 1;
                if prediction.answer.trim() == answer.to_string() {
                    report.correct += 1;
                }
            }
            None => report.unmatched += 1,
        }
    }

    if report.scored > 0 {
        report.accuracy = report.correct as f64 / report.scored as f64;
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, answer: Option<u32>) -> RawRecord {
        RawRecord {
            id: id.to_string(),
            paragraph: String::new(),
            question: String::new(),
            choices: vec!["a".into(), "b".into()],
            answer,
            question_plus: String::new(),
        }
    }

    fn prediction(id: &str, answer: &str) -> Prediction {
        Prediction {
            id: id.to_string(),
            answer: answer.to_string(),
        }
    }

    #[test]
    fn test_accuracy_joins_by_id() {
        let records = vec![record("a", Some(1)), record("b", Some(2)), record("c", None)];
        let predictions = vec![
            prediction("b", "2"),
            prediction("a", "2"),
            prediction("c", "1"),
            prediction("z", "1"),
        ];
        let report = accuracy(&predictions, &records);
        assert_eq!(report.scored, 2);
        assert_eq!(report.correct, 1);
        assert_eq!(report.unmatched, 2);
        assert!((report.accuracy - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_predictions() {
        assert_eq!(accuracy(&[], &[record("a", Some(1))]).accuracy, 0.0);
    }
}
