//! Example formatter: raw record → chat example
//!
//! The user prompt is picked from four templates by two independent
//! switches: whether the record has supplementary context, and whether
//! retrieved hints are attached.

use crate::config::{PipelineConfig, PromptTemplates};
use crate::data::example::{ChatExample, Message, Role};
use crate::data::record::RawRecord;
use crate::data::template::PromptTemplate;
use crate::errors::{PipelineError, Result};

/// Whether examples carry the answer turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetMode {
    Train,
    Eval,
}

/// Which user-prompt template a record uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateVariant {
    QuestionPlus,
    NoQuestionPlus,
    RagQuestionPlus,
    RagNoQuestionPlus,
}

impl TemplateVariant {
    pub fn select(has_question_plus: bool, has_hint: bool) -> Self {
        match (has_question_plus, has_hint) {
            (true, true) => TemplateVariant::RagQuestionPlus,
            (false, true) => TemplateVariant::RagNoQuestionPlus,
            (true, false) => TemplateVariant::QuestionPlus,
            (false, false) => TemplateVariant::NoQuestionPlus,
        }
    }

    fn template<'t>(&self, templates: &'t PromptTemplates) -> &'t PromptTemplate {
        match self {
            TemplateVariant::QuestionPlus => &templates.question_plus,
            TemplateVariant::NoQuestionPlus => &templates.no_question_plus,
            TemplateVariant::RagQuestionPlus => &templates.rag_question_plus,
            TemplateVariant::RagNoQuestionPlus => &templates.rag_no_question_plus,
        }
    }
}

/// Render choices as `"<n> - <text>"` lines in original order
pub fn render_choices(choices: &[String]) -> String {
    choices
        .iter()
        .enumerate()
        .map(|(idx, choice)| format!("{} - {}", idx + 1, choice))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds chat examples from raw records
#[derive(Debug, Clone)]
pub struct ExampleFormatter {
    system_message: String,
    templates: PromptTemplates,
    mode: DatasetMode,
}

impl ExampleFormatter {
    pub fn new(config: &PipelineConfig, mode: DatasetMode) -> Self {
        Self {
            system_message: config.system_message.clone(),
            templates: config.templates.clone(),
            mode,
        }
    }

    pub fn mode(&self) -> DatasetMode {
        self.mode
    }

    /// Format one record; an empty hint counts as no hint
    pub fn format(&self, record: &RawRecord, hint: Option<&str>) -> Result<ChatExample> {
        let hint = hint.filter(|h| !h.trim().is_empty());
        let variant = TemplateVariant::select(record.has_question_plus(), hint.is_some());
        let user_message = self.user_message(record, variant, hint)?;

        let mut messages = vec![
            Message::new(Role::System, self.system_message.clone()),
            Message::new(Role::User, user_message),
        ];

        match self.mode {
            DatasetMode::Train => {
                let answer = record.answer.ok_or_else(|| PipelineError::MalformedRecord {
                    id: record.id.clone(),
                    reason: "training record without an answer".to_string(),
                })?;
                messages.push(Message::new(Role::Assistant, answer.to_string()));
                Ok(ChatExample {
                    id: record.id.clone(),
                    messages,
                    label: Some(answer),
                    len_choices: None,
                    augmented: hint.is_some(),
                })
            }
            DatasetMode::Eval => Ok(ChatExample {
                id: record.id.clone(),
                messages,
                label: None,
                len_choices: Some(record.choices.len()),
                augmented: hint.is_some(),
            }),
        }
    }

    fn user_message(
        &self,
        record: &RawRecord,
        variant: TemplateVariant,
        hint: Option<&str>,
    ) -> Result<String> {
        let choices = render_choices(&record.choices);
        let mut values: Vec<(&str, &str)> = vec![
            ("paragraph", record.paragraph.as_str()),
            ("question", record.question.as_str()),
            ("choices", choices.as_str()),
        ];
        if matches!(
            variant,
            TemplateVariant::QuestionPlus | TemplateVariant::RagQuestionPlus
        ) {
            values.push(("question_plus", record.question_plus.as_str()));
        }
        if let Some(hint) = hint {
            values.push(("hint", hint));
        }

        variant
            .template(&self.templates)
            .render(&values)
            .map_err(|e| PipelineError::MalformedRecord {
                id: record.id.clone(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE;
    use quickcheck_macros::quickcheck;

    fn config() -> PipelineConfig {
        PipelineConfig::from_toml_str(SAMPLE).unwrap()
    }

    fn record(question_plus: &str) -> RawRecord {
        RawRecord {
            id: "1".to_string(),
            paragraph: "short text".to_string(),
            question: "Q?".to_string(),
            choices: vec!["a".to_string(), "b".to_string()],
            answer: Some(2),
            question_plus: question_plus.to_string(),
        }
    }

    #[test]
    fn test_render_choices() {
        assert_eq!(render_choices(&["A".to_string(), "B".to_string()]), "1 - A\n2 - B");
        assert_eq!(render_choices(&[]), "");
    }

    #[quickcheck]
    fn prop_render_choices_order_preserving(choices: Vec<String>) -> bool {
        let choices: Vec<String> = choices.into_iter().map(|c| c.replace('\n', " ")).collect();
        let rendered = render_choices(&choices);
        if choices.is_empty() {
            return rendered.is_empty();
        }
        rendered
            .split('\n')
            .enumerate()
            .all(|(i, line)| line == format!("{} - {}", i + 1, choices[i]))
            && render_choices(&choices) == rendered
    }

    #[test]
    fn test_variant_selection() {
        assert_eq!(TemplateVariant::select(false, false), TemplateVariant::NoQuestionPlus);
        assert_eq!(TemplateVariant::select(true, false), TemplateVariant::QuestionPlus);
        assert_eq!(TemplateVariant::select(false, true), TemplateVariant::RagNoQuestionPlus);
        assert_eq!(TemplateVariant::select(true, true), TemplateVariant::RagQuestionPlus);
    }

    #[test]
    fn test_train_mode_has_three_turns() {
        let formatter = ExampleFormatter::new(&config(), DatasetMode::Train);
        let example = formatter.format(&record(""), None).unwrap();
        assert_eq!(example.messages.len(), 3);
        assert_eq!(example.messages[2].role, Role::Assistant);
        assert_eq!(example.messages[2].content, "2");
        assert_eq!(example.label, Some(2));
        assert!(example.len_choices.is_none());
    }

    #[test]
    fn test_eval_mode_has_two_turns() {
        let formatter = ExampleFormatter::new(&config(), DatasetMode::Eval);
        let example = formatter.format(&record(""), None).unwrap();
        assert_eq!(example.messages.len(), 2);
        assert!(example.messages.iter().all(|m| m.role != Role::Assistant));
        assert_eq!(example.len_choices, Some(2));
        assert_eq!(
            example.messages.iter().map(|m| m.role).collect::<Vec<_>>(),
            vec![Role::System, Role::User]
        );
    }

    #[test]
    fn test_empty_question_plus_omits_slot_text() {
        let formatter = ExampleFormatter::new(&config(), DatasetMode::Eval);
        let user = formatter.format(&record(""), None).unwrap();
        let content = user.user_content().unwrap();
        assert!(!content.contains("<보기>"));
        assert!(content.contains("1 - a\n2 - b"));

        let with_plus = formatter.format(&record("ㄱ. 참"), None).unwrap();
        assert!(with_plus.user_content().unwrap().contains("<보기>:\nㄱ. 참"));
    }

    #[test]
    fn test_hint_selects_rag_template() {
        let formatter = ExampleFormatter::new(&config(), DatasetMode::Train);
        let example = formatter.format(&record(""), Some("retrieved passage")).unwrap();
        let content = example.user_content().unwrap();
        assert!(content.contains("힌트:\nretrieved passage"));
        assert!(!content.contains("<보기>"));
        assert!(example.augmented);
    }

    #[test]
    fn test_blank_hint_falls_back_to_plain_template() {
        let formatter = ExampleFormatter::new(&config(), DatasetMode::Eval);
        let example = formatter.format(&record(""), Some("   ")).unwrap();
        assert!(!example.user_content().unwrap().contains("힌트"));
        assert!(!example.augmented);
    }

    #[test]
    fn test_system_message_default() {
        let formatter = ExampleFormatter::new(&config(), DatasetMode::Eval);
        let example = formatter.format(&record(""), None).unwrap();
        assert_eq!(example.messages[0].content, "지문을 읽고 질문의 답을 구하세요.");
    }

    #[test]
    fn test_training_requires_answer() {
        let formatter = ExampleFormatter::new(&config(), DatasetMode::Train);
        let mut r = record("");
        r.answer = None;
        assert!(matches!(
            formatter.format(&r, None),
            Err(PipelineError::MalformedRecord { .. })
        ));
    }
}
