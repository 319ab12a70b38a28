// Retrieval client - embed a query, search the passage collection, pick ranks
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RagConfig;
use crate::errors::{PipelineError, Result};
use crate::rag::embedding::Embedder;
use crate::rag::vector_db::{SearchHit, VectorSearch, TEXT_FIELD};
use crate::retry::RetryManager;

/// Search parameters for retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub collection: String,
    /// Number of passages requested from the database
    pub top_k: usize,
    /// 1-based ranks kept for the prompt, in this order
    pub use_k: Vec<usize>,
}

impl From<&RagConfig> for SearchParams {
    fn from(config: &RagConfig) -> Self {
        Self {
            collection: config.collection_name.clone(),
            top_k: config.top_k,
            use_k: config.use_k.clone(),
        }
    }
}

/// Ranked passages retrieved for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHint {
    pub hits: Vec<SearchHit>,
}

impl RetrievalHint {
    /// Join the requested ranks with newlines; `None` when nothing usable
    pub fn select(&self, use_k: &[usize]) -> Option<String> {
        let parts: Vec<&str> = use_k
            .iter()
            .filter_map(|&rank| rank.checked_sub(1).and_then(|i| self.hits.get(i)))
            .map(|hit| hit.text.as_str())
            .filter(|text| !text.trim().is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

/// Embeds queries and searches the vector database
pub struct RetrievalClient {
    embedder: Box<dyn Embedder>,
    search: Box<dyn VectorSearch>,
    params: SearchParams,
    retry: RetryManager,
}

impl RetrievalClient {
    pub fn new(
        embedder: Box<dyn Embedder>,
        search: Box<dyn VectorSearch>,
        params: SearchParams,
        retry: RetryManager,
    ) -> Self {
        Self {
            embedder,
            search,
            params,
            retry,
        }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// Top-k passages for a query, retrying transient failures
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalHint> {
        let embedder = &self.embedder;
        let embedding = self
            .retry
            .execute_with_retry(|| async move {
                embedder
                    .embed(query)
                    .map_err(|e| PipelineError::Retrieval(format!("embedding failed: {}", e)))
            })
            .await?;

        let hits = self
            .retry
            .execute_with_retry(|| {
                self.search
                    .search(&self.params.collection, &embedding, self.params.top_k, TEXT_FIELD)
            })
            .await?;

        debug!(query, hits = hits.len(), "retrieved passages");
        Ok(RetrievalHint { hits })
    }

    /// Retrieve and reduce to the prompt hint
    pub async fn hint_for(&self, query: &str) -> Result<Option<String>> {
        Ok(self.retrieve(query).await?.select(&self.params.use_k))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    pub(crate) struct FixedEmbedder;

    impl Embedder for FixedEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.chars().count() as f32, 1.0])
        }
    }

    /// Fails the first `failures` calls, then behaves like `FixedEmbedder`
    struct FlakyEmbedder {
        failures: usize,
        calls: Arc<AtomicUsize>,
    }

    impl Embedder for FlakyEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(PipelineError::Model("device busy".to_string()));
            }
            FixedEmbedder.embed(text)
        }
    }

    /// Returns `passages` as hits, failing the first `failures` calls
    pub(crate) struct ScriptedSearch {
        pub passages: Vec<String>,
        pub failures: usize,
        pub calls: Arc<AtomicUsize>,
    }

    impl ScriptedSearch {
        pub(crate) fn new(passages: &[&str]) -> Self {
            Self {
                passages: passages.iter().map(|p| p.to_string()).collect(),
                failures: 0,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl VectorSearch for ScriptedSearch {
        async fn search(
            &self,
            _collection: &str,
            _embedding: &[f32],
            limit: usize,
            output_field: &str,
        ) -> Result<Vec<SearchHit>> {
            assert_eq!(output_field, TEXT_FIELD);
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(PipelineError::Retrieval("unavailable".to_string()));
            }
            Ok(self
                .passages
                .iter()
                .take(limit)
                .enumerate()
                .map(|(i, text)| SearchHit {
                    text: text.clone(),
                    score: 1.0 - i as f32 * 0.1,
                })
                .collect())
        }
    }

    fn params(use_k: Vec<usize>) -> SearchParams {
        SearchParams {
            collection: "wiki".to_string(),
            top_k: 3,
            use_k,
        }
    }

    fn hint(texts: &[&str]) -> RetrievalHint {
        RetrievalHint {
            hits: texts
                .iter()
                .map(|t| SearchHit {
                    text: t.to_string(),
                    score: 0.5,
                })
                .collect(),
        }
    }

    #[test]
    fn test_select_single_rank() {
        assert_eq!(hint(&["a", "b", "c"]).select(&[2]).as_deref(), Some("b"));
    }

    #[test]
    fn test_select_joins_in_listed_order() {
        assert_eq!(hint(&["a", "b", "c"]).select(&[3, 1]).as_deref(), Some("c\na"));
    }

    #[test]
    fn test_select_skips_missing_ranks() {
        assert_eq!(hint(&["a"]).select(&[1, 2]).as_deref(), Some("a"));
        assert_eq!(hint(&[]).select(&[1]), None);
        assert_eq!(hint(&["a"]).select(&[0]), None);
    }

    #[tokio::test]
    async fn test_hint_for_respects_top_k() {
        let client = RetrievalClient::new(
            Box::new(FixedEmbedder),
            Box::new(ScriptedSearch::new(&["p1", "p2", "p3", "p4"])),
            params(vec![1, 3]),
            RetryManager::with_config(3, 1),
        );
        let retrieved = client.retrieve("query").await.unwrap();
        assert_eq!(retrieved.hits.len(), 3);
        assert_eq!(client.hint_for("query").await.unwrap().as_deref(), Some("p1\np3"));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let mut search = ScriptedSearch::new(&["p1"]);
        search.failures = 2;
        let calls = search.calls.clone();
        let client = RetrievalClient::new(
            Box::new(FixedEmbedder),
            Box::new(search),
            params(vec![1]),
            RetryManager::with_config(3, 1),
        );
        assert_eq!(client.hint_for("q").await.unwrap().as_deref(), Some("p1"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let embedder = FlakyEmbedder {
            failures: 1,
            calls: calls.clone(),
        };
        let client = RetrievalClient::new(
            Box::new(embedder),
            Box::new(ScriptedSearch::new(&["p1"])),
            params(vec![1]),
            RetryManager::with_config(3, 1),
        );
        assert_eq!(client.hint_for("q").await.unwrap().as_deref(), Some("p1"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_persistent_embedding_failure_exhausts_retries() {
        let embedder = FlakyEmbedder {
            failures: usize::MAX,
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let search = ScriptedSearch::new(&["p1"]);
        let search_calls = search.calls.clone();
        let client = RetrievalClient::new(
            Box::new(embedder),
            Box::new(search),
            params(vec![1]),
            RetryManager::with_config(2, 1),
        );
        assert!(matches!(
            client.hint_for("q").await,
            Err(PipelineError::RetriesExhausted { attempts: 2, .. })
        ));
        assert_eq!(search_calls.load(Ordering::SeqCst), 0);
    }
}
