//! Placeholder templates for user prompts
//!
//! Templates use brace placeholders (`{paragraph}`), with `{{` and `}}`
//! standing for literal braces. Templates are parsed once when the
//! configuration is validated and rendered once per record.

use crate::errors::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(String),
}

/// A parsed prompt template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template string
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' => {
                    if matches!(chars.peek(), Some((_, '{'))) {
                        chars.next();
                        text.push('{');
                        continue;
                    }

                    let mut name = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        name.push(inner);
                    }

                    if !closed {
                        return Err(PipelineError::Template(format!(
                            "unclosed placeholder starting at byte {}",
                            pos
                        )));
                    }
                    if name.is_empty()
                        || !name.chars().all(|ch| ch.is_alphanumeric() || ch == '_')
                    {
                        return Err(PipelineError::Template(format!(
                            "invalid placeholder name '{{{}}}'",
                            name
                        )));
                    }

                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Slot(name));
                }
                '}' => {
                    if matches!(chars.peek(), Some((_, '}'))) {
                        chars.next();
                        text.push('}');
                    } else {
                        return Err(PipelineError::Template(format!(
                            "single '}}' at byte {}",
                            pos
                        )));
                    }
                }
                _ => text.push(c),
            }
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self { segments })
    }

    /// Placeholder names in order of appearance (duplicates kept)
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Slot(name) => Some(name.as_str()),
            Segment::Text(_) => None,
        })
    }

    /// Whether the template references the named slot
    pub fn references(&self, name: &str) -> bool {
        self.placeholders().any(|p| p == name)
    }

    /// Substitute every placeholder; an unbound placeholder is an error
    pub fn render(&self, values: &[(&str, &str)]) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Slot(name) => {
                    let value = values
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| *v)
                        .ok_or_else(|| {
                            PipelineError::Template(format!("no value bound for '{{{}}}'", name))
                        })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}
