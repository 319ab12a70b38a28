//! Tokenizer and chat-template glue
//!
//! Wraps a `tokenizers::Tokenizer` together with the chat template and
//! special tokens declared in `tokenizer_config.json`.

pub mod chat_template;

pub use chat_template::{ChatRenderer, HuggingFaceChatTemplate};

use serde_json::Value;
use tokenizers::Tokenizer;

use crate::data::example::Message;
use crate::errors::{PipelineError, Result};
use crate::hub::ModelFiles;

/// Token ids and attention mask of one encoded text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
}

/// Tokenizer paired with its chat template
pub struct ChatTokenizer {
    tokenizer: Tokenizer,
    renderer: Box<dyn ChatRenderer>,
    pad_id: u32,
}

impl ChatTokenizer {
    pub fn new(tokenizer: Tokenizer, renderer: Box<dyn ChatRenderer>, pad_id: u32) -> Self {
        Self {
            tokenizer,
            renderer,
            pad_id,
        }
    }

    /// Load `tokenizer.json` and `tokenizer_config.json` of a model
    pub fn from_model_files(files: &ModelFiles) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(files.get("tokenizer.json")?)?;
        let config: Value = files.json("tokenizer_config.json")?;
        Self::from_parts(tokenizer, &config)
    }

    /// Build from a loaded tokenizer and a parsed `tokenizer_config.json`
    pub fn from_parts(tokenizer: Tokenizer, config: &Value) -> Result<Self> {
        let template = chat_template_source(config).ok_or_else(|| {
            PipelineError::Tokenization("tokenizer_config.json has no chat_template".to_string())
        })?;
        let bos = special_token(config, "bos_token").unwrap_or_default();
        let eos = special_token(config, "eos_token").unwrap_or_default();

        // pad falls back to eos like most causal LM setups
        let pad_token = special_token(config, "pad_token").unwrap_or_else(|| eos.clone());
        let pad_id = tokenizer.token_to_id(&pad_token).ok_or_else(|| {
            PipelineError::Tokenization(format!("pad token '{}' not in vocabulary", pad_token))
        })?;

        let renderer = HuggingFaceChatTemplate::create(template, bos, eos)?;
        Ok(Self::new(tokenizer, Box::new(renderer), pad_id))
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    pub fn token_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }

    /// Render messages to text through the chat template
    pub fn render(&self, messages: &[Message], add_generation_prompt: bool) -> Result<String> {
        self.renderer.render(messages, add_generation_prompt)
    }

    /// Encode rendered text; the template already carries special tokens
    pub fn encode(&self, text: &str) -> Result<Encoded> {
        let encoding = self.tokenizer.encode(text, false)?;
        Ok(Encoded {
            input_ids: encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
        })
    }

    /// Encode many texts at once, no truncation and no padding
    pub fn encode_batch(&self, texts: Vec<String>) -> Result<Vec<Encoded>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let encodings = self.tokenizer.encode_batch(texts, false)?;
        Ok(encodings
            .into_iter()
            .map(|e| Encoded {
                input_ids: e.get_ids().to_vec(),
                attention_mask: e.get_attention_mask().to_vec(),
            })
            .collect())
    }

    /// Render and encode a conversation in one step
    pub fn encode_chat(&self, messages: &[Message], add_generation_prompt: bool) -> Result<Vec<u32>> {
        let text = self.render(messages, add_generation_prompt)?;
        Ok(self.encode(&text)?.input_ids)
    }

    pub fn encode_ids(&self, text: &str) -> Result<Vec<u32>> {
        Ok(self.encode(text)?.input_ids)
    }

    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        Ok(self.tokenizer.decode(ids, skip_special_tokens)?)
    }
}

/// `chat_template` is either a string or a list of named templates
fn chat_template_source(config: &Value) -> Option<String> {
    match config.get("chat_template")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items
            .iter()
            .find(|item| item.get("name").and_then(Value::as_str) == Some("default"))
            .or_else(|| items.first())
            .and_then(|item| item.get("template"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Special tokens appear either as plain strings or as `{"content": ...}`
fn special_token(config: &Value, key: &str) -> Option<String> {
    match config.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("content").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::example::Role;
    use std::str::FromStr;

    /// Whitespace word-level tokenizer over a tiny ChatML-ish vocabulary
    pub(crate) fn test_tokenizer() -> ChatTokenizer {
        let vocab = [
            "<pad>", "<unk>", "<s>", "</s>", "system", "user", "assistant", "1", "2", "3", "4",
            "5", "지문", "질문", "선택지", "-", "a", "b", "c", "d", "answer",
        ];
        let vocab_json: serde_json::Map<String, Value> = vocab
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), Value::from(i as u64)))
            .collect();
        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                {"id": 0, "content": "<pad>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 2, "content": "<s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 3, "content": "</s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
            ],
            "normalizer": null,
            "pre_tokenizer": {"type": "Whitespace"},
            "post_processor": null,
            "decoder": null,
            "model": {"type": "WordLevel", "vocab": vocab_json, "unk_token": "<unk>"}
        });
        let tokenizer = Tokenizer::from_str(&tokenizer_json.to_string()).unwrap();
        let config = serde_json::json!({
            "chat_template": "{% for m in messages %}<s> {{ m['role'] }} {{ m['content'] }} </s> {% endfor %}{% if add_generation_prompt %}<s> assistant {% endif %}",
            "bos_token": "<s>",
            "eos_token": {"content": "</s>"},
            "pad_token": "<pad>"
        });
        ChatTokenizer::from_parts(tokenizer, &config).unwrap()
    }

    #[test]
    fn test_special_tokens_resolved() {
        let tok = test_tokenizer();
        assert_eq!(tok.pad_id(), 0);
        assert_eq!(tok.token_id("3"), Some(9));
    }

    #[test]
    fn test_encode_chat_with_generation_prompt() {
        let tok = test_tokenizer();
        let msgs = vec![Message::new(Role::User, "질문 a")];
        let ids = tok.encode_chat(&msgs, true).unwrap();
        assert_eq!(ids, vec![2, 5, 13, 16, 3, 2, 6]);
    }

    #[test]
    fn test_encode_batch_no_padding() {
        let tok = test_tokenizer();
        let out = tok
            .encode_batch(vec!["a b c".to_string(), "d".to_string()])
            .unwrap();
        assert_eq!(out[0].input_ids.len(), 3);
        assert_eq!(out[1].input_ids.len(), 1);
        assert_eq!(out[1].attention_mask, vec![1]);
    }

    #[test]
    fn test_missing_chat_template() {
        let tok = test_tokenizer().tokenizer;
        let err = ChatTokenizer::from_parts(tok, &serde_json::json!({})).err();
        assert!(matches!(err, Some(PipelineError::Tokenization(_))));
    }

    #[test]
    fn test_named_template_list() {
        let config = serde_json::json!({
            "chat_template": [
                {"name": "tool_use", "template": "x"},
                {"name": "default", "template": "y"}
            ]
        });
        assert_eq!(chat_template_source(&config).as_deref(), Some("y"));
    }
}
