//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kmcqa::errors::{PipelineError, Result};
use kmcqa::rag::retrieval::SearchParams;
use kmcqa::rag::rewriter::{GenerationOptions, QueryGenerator};
use kmcqa::rag::{Augmenter, Embedder, QueryRewriter, RetrievalClient, SearchHit, VectorSearch};
use kmcqa::retry::RetryManager;
use kmcqa::tokenizer::ChatTokenizer;
use kmcqa::PipelineConfig;

pub const CONFIG: &str = r#"
max_length = 512
PROMPT_SYSTEM_MESSAGE = ""
PROMPT_QUESTION_PLUS = "지문:\n{paragraph}\n\n질문:\n{question}\n\n<보기>:\n{question_plus}\n\n선택지:\n{choices}"
PROMPT_NO_QUESTION_PLUS = "지문:\n{paragraph}\n\n질문:\n{question}\n\n선택지:\n{choices}"
RAG_PROMPT_QUESTION_PLUS = "지문:\n{paragraph}\n\n힌트:\n{hint}\n\n질문:\n{question}\n\n<보기>:\n{question_plus}\n\n선택지:\n{choices}"
RAG_PROMPT_NO_QUESTION_PLUS = "지문:\n{paragraph}\n\n힌트:\n{hint}\n\n질문:\n{question}\n\n선택지:\n{choices}"
rag_flag = 50
top_k = 3
use_k = [1, 2]
collection_name = "wiki"
database_path = "http://localhost:6334"
rewrite_model = "paust/pko-t5-base"
rewrite_prefix = "요약: "

[model]
response_template = "<s> assistant"
"#;

pub fn config() -> PipelineConfig {
    PipelineConfig::from_toml_str(CONFIG).expect("fixture config is valid")
}

/// Word-level tokenizer over the vocabulary the fixtures use
pub fn tokenizer() -> ChatTokenizer {
    let vocab = [
        "<pad>", "<unk>", "<s>", "</s>", "system", "user", "assistant", "1", "2", "3", "4", "5",
        "지문", "질문", "선택지", "힌트", "-", ":", "short", "text", "Q", "?", "a", "b", "c",
    ];
    let vocab_json: serde_json::Map<String, serde_json::Value> = vocab
        .iter()
        .enumerate()
        .map(|(i, t)| (t.to_string(), serde_json::Value::from(i as u64)))
        .collect();
    let special = |id: u32, content: &str| {
        serde_json::json!({"id": id, "content": content, "single_word": false, "lstrip": false,
            "rstrip": false, "normalized": false, "special": true})
    };
    let tokenizer_json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [special(0, "<pad>"), special(2, "<s>"), special(3, "</s>")],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {"type": "WordLevel", "vocab": vocab_json, "unk_token": "<unk>"}
    });
    let tokenizer = tokenizers::Tokenizer::from_str(&tokenizer_json.to_string())
        .expect("fixture tokenizer parses");
    let tokenizer_config = serde_json::json!({
        "chat_template": "{% for m in messages %}<s> {{ m['role'] }} {{ m['content'] }} </s> {% endfor %}{% if add_generation_prompt %}<s> assistant {% endif %}",
        "bos_token": "<s>",
        "eos_token": "</s>",
        "pad_token": "<pad>"
    });
    ChatTokenizer::from_parts(tokenizer, &tokenizer_config).expect("fixture tokenizer config")
}

/// Always produces the same query
pub struct EchoGenerator(pub String);

impl QueryGenerator for EchoGenerator {
    fn generate(&mut self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
        Ok(self.0.clone())
    }
}

pub struct UnitEmbedder;

impl Embedder for UnitEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0])
    }
}

/// Fails every call, counting them
pub struct BrokenEmbedder {
    pub calls: Arc<AtomicUsize>,
}

impl Embedder for BrokenEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PipelineError::Model("CUDA out of memory".to_string()))
    }
}

/// Fixed passages; can be told to fail every call
pub struct StaticSearch {
    pub passages: Vec<String>,
    pub fail: bool,
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl VectorSearch for StaticSearch {
    async fn search(
        &self,
        _collection: &str,
        _embedding: &[f32],
        limit: usize,
        _output_field: &str,
    ) -> Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PipelineError::Retrieval("connection refused".to_string()));
        }
        Ok(self
            .passages
            .iter()
            .take(limit)
            .map(|text| SearchHit {
                text: text.clone(),
                score: 0.9,
            })
            .collect())
    }
}

/// Augmenter over fakes; returns the search call counter too
pub fn augmenter(config: &PipelineConfig, passages: &[&str], fail: bool) -> (Augmenter, Arc<AtomicUsize>) {
    augmenter_with(config, Box::new(UnitEmbedder), passages, fail)
}

pub fn augmenter_with(
    config: &PipelineConfig,
    embedder: Box<dyn Embedder>,
    passages: &[&str],
    fail: bool,
) -> (Augmenter, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let search = StaticSearch {
        passages: passages.iter().map(|p| p.to_string()).collect(),
        fail,
        calls: calls.clone(),
    };
    let rewriter = QueryRewriter::new(
        Box::new(EchoGenerator("짧은 지문에 대한 질의.".to_string())),
        config.rag.rewrite_prefix.clone(),
        config.rag.rewrite_fallback_chars,
    );
    let retrieval = RetrievalClient::new(
        embedder,
        Box::new(search),
        SearchParams::from(&config.rag),
        RetryManager::with_config(2, 1),
    );
    (Augmenter::new(rewriter, retrieval, config.rag.rag_flag), calls)
}

/// Write `rows` (without header) to a CSV in `dir`
pub fn write_csv(dir: &std::path::Path, name: &str, rows: &[&str]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut contents = String::from("id,paragraph,problems\n");
    for row in rows {
        contents.push_str(row);
        contents.push('\n');
    }
    std::fs::write(&path, contents).expect("write fixture csv");
    path
}
