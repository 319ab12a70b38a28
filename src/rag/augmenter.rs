// Retrieval augmentation - rewrite, retrieve and hand a hint to the formatter
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::data::record::RawRecord;
use crate::errors::{PipelineError, Result};
use crate::rag::embedding::BertEmbedder;
use crate::rag::retrieval::{RetrievalClient, SearchParams};
use crate::rag::rewriter::{GenerationOptions, QueryRewriter, T5Generator};
use crate::rag::vector_db::QdrantSearch;
use crate::retry::RetryManager;

/// Retrieval is attempted only for paragraphs strictly shorter than `rag_flag`
pub fn should_augment(record: &RawRecord, rag_flag: usize) -> bool {
    record.paragraph_len() < rag_flag
}

/// Turn a retrieval outage into `Ok(None)`, logging it
fn unavailable_as_none<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e @ (PipelineError::Retrieval(_) | PipelineError::RetriesExhausted { .. })) => {
            warn!(error = %e, "vector database unavailable, augmentation disabled");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Counters for one augmentation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AugmentStats {
    pub triggered: usize,
    pub augmented: usize,
    pub rewrite_fallbacks: usize,
    pub retrieval_failures: usize,
}

/// Holds the rewrite and embedding models for the duration of a format pass
///
/// Both models live only as long as this value. Dropping it, on success or
/// on an early return, releases their device memory before tokenization.
pub struct Augmenter {
    rewriter: QueryRewriter,
    retrieval: RetrievalClient,
    rag_flag: usize,
    stats: AugmentStats,
}

impl Augmenter {
    pub fn new(rewriter: QueryRewriter, retrieval: RetrievalClient, rag_flag: usize) -> Self {
        Self {
            rewriter,
            retrieval,
            rag_flag,
            stats: AugmentStats::default(),
        }
    }

    /// Load the rewrite model, embedding model and database client
    pub async fn load(config: &RagConfig, seed: u64) -> Result<Self> {
        info!(
            rewrite_model = %config.rewrite_model,
            embedding_model = %config.embedding_model,
            collection = %config.collection_name,
            "loading retrieval models"
        );

        let retry = RetryManager::with_config(config.max_retries, config.base_delay_ms);
        let search = QdrantSearch::connect(&config.database_path)?;
        retry
            .execute_with_retry(|| search.check_collection(&config.collection_name))
            .await?;

        let generator = T5Generator::load(&config.rewrite_model)?;
        let rewriter = QueryRewriter::new(
            Box::new(generator),
            config.rewrite_prefix.clone(),
            config.rewrite_fallback_chars,
        )
        .with_options(GenerationOptions {
            seed,
            ..GenerationOptions::default()
        });

        let embedder = BertEmbedder::load(&config.embedding_model)?;
        let retrieval = RetrievalClient::new(
            Box::new(embedder),
            Box::new(search),
            SearchParams::from(config),
            retry,
        );

        Ok(Self::new(rewriter, retrieval, config.rag_flag))
    }

    /// Like [`Augmenter::load`], but an unreachable database yields `None`
    ///
    /// The pass then runs with the plain templates. Configuration and model
    /// errors stay fatal.
    pub async fn load_optional(config: &RagConfig, seed: u64) -> Result<Option<Self>> {
        unavailable_as_none(Self::load(config, seed).await)
    }

    pub fn rag_flag(&self) -> usize {
        self.rag_flag
    }

    pub fn stats(&self) -> &AugmentStats {
        &self.stats
    }

    /// Hint text for one record, `None` when retrieval is skipped or fails
    pub async fn hint(&mut self, record: &RawRecord) -> Option<String> {
        if !should_augment(record, self.rag_flag) {
            return None;
        }
        self.stats.triggered += 1;
        debug!(id = %record.id, len = record.paragraph_len(), "retrieval triggered");

        let query = self.rewriter.rewrite(record);
        if query.fallback {
            self.stats.rewrite_fallbacks += 1;
        }

        match self.retrieval.hint_for(&query.text).await {
            Ok(Some(hint)) => {
                self.stats.augmented += 1;
                Some(hint)
            }
            Ok(None) => {
                debug!(id = %record.id, "no usable passages");
                None
            }
            Err(e) => {
                self.stats.retrieval_failures += 1;
                warn!(id = %record.id, error = %e, "retrieval failed, using plain template");
                None
            }
        }
    }

    /// Release the models now and return the pass counters
    pub fn release(self) -> AugmentStats {
        self.stats.clone()
    }
}

impl Drop for Augmenter {
    fn drop(&mut self) {
        info!(
            triggered = self.stats.triggered,
            augmented = self.stats.augmented,
            "released retrieval models"
        );
    }
}
