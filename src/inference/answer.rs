//! Answer extraction from generated text

use regex::Regex;
use std::sync::OnceLock;

fn digits() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"[0-9]+").expect("digit pattern is valid"))
}

/// First run of ASCII digits, or the trimmed text when there is none
pub fn extract_answer(text: &str) -> String {
    match digits().find(text) {
        Some(m) => m.as_str().to_string(),
        None => text.trim().to_string(),
    }
}
