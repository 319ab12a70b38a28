//! Configuration management for kmcqa
//!
//! TOML-based configuration. Every required key is read as optional first so
//! that validation can report all missing keys in a single error.
//! Lookup order when no path is given: ./config.toml, ~/.kmcqa/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::labels::{LabelMode, PaddingSide};
use crate::data::template::PromptTemplate;
use crate::errors::{PipelineError, Result};

/// Instruction used when `PROMPT_SYSTEM_MESSAGE` is left empty
pub const DEFAULT_SYSTEM_MESSAGE: &str = "지문을 읽고 질문의 답을 구하세요.";

const BASE_SLOTS: &[&str] = &["paragraph", "question", "choices"];

/// The configuration file exactly as written
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub max_length: Option<usize>,
    #[serde(rename = "PROMPT_SYSTEM_MESSAGE")]
    pub prompt_system_message: Option<String>,
    #[serde(rename = "PROMPT_QUESTION_PLUS")]
    pub prompt_question_plus: Option<String>,
    #[serde(rename = "PROMPT_NO_QUESTION_PLUS")]
    pub prompt_no_question_plus: Option<String>,
    #[serde(rename = "RAG_PROMPT_QUESTION_PLUS")]
    pub rag_prompt_question_plus: Option<String>,
    #[serde(rename = "RAG_PROMPT_NO_QUESTION_PLUS")]
    pub rag_prompt_no_question_plus: Option<String>,
    pub rag_flag: Option<usize>,
    pub top_k: Option<usize>,
    pub use_k: Option<Vec<usize>>,
    pub collection_name: Option<String>,
    pub database_path: Option<String>,
    pub rewrite_model: Option<String>,
    pub rewrite_prefix: Option<String>,

    pub rewrite_fallback_chars: Option<usize>,
    pub retrieval_max_retries: Option<u32>,
    pub retrieval_base_delay_ms: Option<u64>,
    pub embedding_model: Option<String>,

    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_length: usize,
    pub system_message: String,
    pub templates: PromptTemplates,
    pub rag: RagConfig,
    pub data: DataConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
}

/// The four user-prompt variants
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub question_plus: PromptTemplate,
    pub no_question_plus: PromptTemplate,
    pub rag_question_plus: PromptTemplate,
    pub rag_no_question_plus: PromptTemplate,
}

/// Retrieval augmentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub enabled: bool,
    /// Paragraphs strictly shorter than this many characters are augmented
    pub rag_flag: usize,
    pub top_k: usize,
    /// 1-based ranks inserted into the prompt, in this order
    pub use_k: Vec<usize>,
    pub collection_name: String,
    pub database_path: String,
    pub rewrite_model: String,
    pub rewrite_prefix: String,
    pub rewrite_fallback_chars: usize,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub embedding_model: String,
}

/// Input and output locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: String,
    pub train_path: String,
    pub eval_path: String,
    pub test_path: String,
    pub output_dir: String,
}

/// Fine-tuned model and tokenizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Local directory or hub id
    pub model_path: String,
    pub padding_side: PaddingSide,
    pub response_template: String,
    pub label_mode: LabelMode,
    pub seed: u64,
    pub generation_top_k: usize,
}

/// Hyper-parameters handed to the external trainer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub num_train_epochs: u32,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub logging_steps: u32,
    pub save_total_limit: u32,
    pub gradient_accumulation_steps: u32,
    pub per_device_batch_size: u32,
    pub lr_scheduler_type: String,
    pub lora: LoraConfig,
}

/// Low-rank adapter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoraConfig {
    pub rank: u32,
    pub lora_alpha: u32,
    pub lora_dropout: f64,
    pub target_modules: Vec<String>,
    pub bias: String,
    pub task_type: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            train_path: "train.csv".to_string(),
            eval_path: "valid.csv".to_string(),
            test_path: "test.csv".to_string(),
            output_dir: "output".to_string(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: "Qwen/Qwen2.5-1.5B-Instruct".to_string(),
            padding_side: PaddingSide::Right,
            response_template: "<|im_start|>assistant\n".to_string(),
            label_mode: LabelMode::Copy,
            seed: 42,
            generation_top_k: 10,
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_train_epochs: 3,
            learning_rate: 2e-5,
            weight_decay: 0.01,
            logging_steps: 1,
            save_total_limit: 2,
            gradient_accumulation_steps: 4,
            per_device_batch_size: 1,
            lr_scheduler_type: "cosine".to_string(),
            lora: LoraConfig::default(),
        }
    }
}

impl Default for LoraConfig {
    fn default() -> Self {
        Self {
            rank: 6,
            lora_alpha: 8,
            lora_dropout: 0.05,
            target_modules: vec!["q_proj".to_string(), "k_proj".to_string()],
            bias: "none".to_string(),
            task_type: "CAUSAL_LM".to_string(),
        }
    }
}

impl DataConfig {
    pub fn resolve(&self, file: &str) -> PathBuf {
        Path::new(&self.data_dir).join(file)
    }

    pub fn train_file(&self) -> PathBuf {
        self.resolve(&self.train_path)
    }

    pub fn eval_file(&self) -> PathBuf {
        self.resolve(&self.eval_path)
    }

    pub fn test_file(&self) -> PathBuf {
        self.resolve(&self.test_path)
    }
}

impl ConfigFile {
    /// Validate and convert, reporting all missing keys at once
    pub fn into_config(self) -> Result<PipelineConfig> {
        let mut missing = Vec::new();
        let mut required = |key: &str, present: bool| {
            if !present {
                missing.push(key.to_string());
            }
        };

        required("max_length", self.max_length.is_some());
        required("PROMPT_SYSTEM_MESSAGE", self.prompt_system_message.is_some());
        required("PROMPT_QUESTION_PLUS", self.prompt_question_plus.is_some());
        required("PROMPT_NO_QUESTION_PLUS", self.prompt_no_question_plus.is_some());
        required("RAG_PROMPT_QUESTION_PLUS", self.rag_prompt_question_plus.is_some());
        required("RAG_PROMPT_NO_QUESTION_PLUS", self.rag_prompt_no_question_plus.is_some());
        required("rag_flag", self.rag_flag.is_some());
        required("top_k", self.top_k.is_some());
        required("use_k", self.use_k.is_some());
        required("collection_name", self.collection_name.is_some());
        required("database_path", self.database_path.is_some());
        required("rewrite_model", self.rewrite_model.is_some());
        required("rewrite_prefix", self.rewrite_prefix.is_some());

        if !missing.is_empty() {
            return Err(PipelineError::MissingConfigKeys(missing));
        }

        // every required key is present past this point
        let max_length = self.max_length.unwrap_or_default();
        let system_message = self.prompt_system_message.unwrap_or_default();
        let question_plus = self.prompt_question_plus.unwrap_or_default();
        let no_question_plus = self.prompt_no_question_plus.unwrap_or_default();
        let rag_question_plus = self.rag_prompt_question_plus.unwrap_or_default();
        let rag_no_question_plus = self.rag_prompt_no_question_plus.unwrap_or_default();

        let templates = PromptTemplates {
            question_plus: parse_template("PROMPT_QUESTION_PLUS", &question_plus, &["question_plus"])?,
            no_question_plus: parse_template("PROMPT_NO_QUESTION_PLUS", &no_question_plus, &[])?,
            rag_question_plus: parse_template(
                "RAG_PROMPT_QUESTION_PLUS",
                &rag_question_plus,
                &["question_plus", "hint"],
            )?,
            rag_no_question_plus: parse_template(
                "RAG_PROMPT_NO_QUESTION_PLUS",
                &rag_no_question_plus,
                &["hint"],
            )?,
        };

        let system_message = if system_message.trim().is_empty() {
            DEFAULT_SYSTEM_MESSAGE.to_string()
        } else {
            system_message
        };

        let config = PipelineConfig {
            max_length,
            system_message,
            templates,
            rag: RagConfig {
                enabled: true,
                rag_flag: self.rag_flag.unwrap_or_default(),
                top_k: self.top_k.unwrap_or_default(),
                use_k: self.use_k.unwrap_or_default(),
                collection_name: self.collection_name.unwrap_or_default(),
                database_path: self.database_path.unwrap_or_default(),
                rewrite_model: self.rewrite_model.unwrap_or_default(),
                rewrite_prefix: self.rewrite_prefix.unwrap_or_default(),
                rewrite_fallback_chars: self.rewrite_fallback_chars.unwrap_or(200),
                max_retries: self.retrieval_max_retries.unwrap_or(crate::retry::MAX_RETRIES),
                base_delay_ms: self.retrieval_base_delay_ms.unwrap_or(200),
                embedding_model: self
                    .embedding_model
                    .unwrap_or_else(|| crate::rag::embedding::DEFAULT_MODEL_ID.to_string()),
            },
            data: self.data,
            model: self.model,
            training: self.training,
        };

        config.validate()?;
        Ok(config)
    }
}

fn parse_template(key: &str, source: &str, extra_slots: &[&str]) -> Result<PromptTemplate> {
    let template = PromptTemplate::parse(source)
        .map_err(|e| PipelineError::Configuration(format!("{}: {}", key, e)))?;

    if let Some(unknown) = template
        .placeholders()
        .find(|p| !BASE_SLOTS.contains(p) && !extra_slots.contains(p))
    {
        return Err(PipelineError::Configuration(format!(
            "{} references unsupported placeholder '{{{}}}'",
            key, unknown
        )));
    }

    Ok(template)
}

impl PipelineConfig {
    /// Load configuration from file or the default locations
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_file(p),
            None => {
                let path = Self::default_path().ok_or_else(|| {
                    PipelineError::Configuration(
                        "no config.toml in the working directory or ~/.kmcqa".to_string(),
                    )
                })?;
                Self::load_from_file(&path)
            }
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| PipelineError::Configuration(format!("Failed to parse config: {}", e)))?;
        file.into_config()
    }

    /// First existing config file among the standard locations
    pub fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from("config.toml");
        if local.exists() {
            return Some(local);
        }
        dirs::home_dir()
            .map(|home| home.join(".kmcqa").join("config.toml"))
            .filter(|p| p.exists())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.max_length == 0 {
            return Err(PipelineError::Configuration(
                "max_length must be greater than 0".to_string(),
            ));
        }

        if self.rag.top_k == 0 {
            return Err(PipelineError::Configuration(
                "top_k must be greater than 0".to_string(),
            ));
        }

        if self.rag.use_k.is_empty() {
            return Err(PipelineError::Configuration(
                "use_k must list at least one rank".to_string(),
            ));
        }

        if let Some(rank) = self
            .rag
            .use_k
            .iter()
            .find(|&&k| k == 0 || k > self.rag.top_k)
        {
            return Err(PipelineError::Configuration(format!(
                "use_k rank {} outside 1..={}",
                rank, self.rag.top_k
            )));
        }

        if self.model.generation_top_k == 0 {
            return Err(PipelineError::Configuration(
                "generation_top_k must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Disable retrieval augmentation regardless of paragraph length
    pub fn without_rag(mut self) -> Self {
        self.rag.enabled = false;
        self
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.output_dir)
    }
}
