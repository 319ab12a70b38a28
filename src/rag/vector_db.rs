// Vector database access - Qdrant similarity search over a passage collection
use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        value::Kind, with_payload_selector::SelectorOptions, Distance, PayloadIncludeSelector,
        SearchPoints, Value as QdrantValue, WithPayloadSelector,
    },
};
use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, Result};

/// Payload field holding the passage text
pub const TEXT_FIELD: &str = "text";

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub score: f32,
}

/// Similarity search over a named collection
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Top `limit` hits for `embedding`, best first
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        output_field: &str,
    ) -> Result<Vec<SearchHit>>;
}

/// Qdrant-backed passage search
pub struct QdrantSearch {
    client: QdrantClient,
}

impl QdrantSearch {
    /// Connect to the Qdrant endpoint at `url`
    pub fn connect(url: &str) -> Result<Self> {
        let client = QdrantClient::from_url(url)
            .build()
            .map_err(|e| PipelineError::Retrieval(format!("Failed to create Qdrant client: {}", e)))?;
        Ok(Self { client })
    }

    /// Fail early when the collection is missing or not cosine-indexed
    pub async fn check_collection(&self, collection: &str) -> Result<()> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| PipelineError::Retrieval(format!("collection '{}': {}", collection, e)))?;

        let distance = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|cfg| match cfg {
                qdrant_client::qdrant::vectors_config::Config::Params(params) => Some(params.distance),
                _ => None,
            });

        match distance {
            Some(d) if d != Distance::Cosine as i32 => Err(PipelineError::Configuration(format!(
                "collection '{}' is not indexed with cosine distance",
                collection
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl VectorSearch for QdrantSearch {
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        output_field: &str,
    ) -> Result<Vec<SearchHit>> {
        let search_result = self
            .client
            .search_points(&SearchPoints {
                collection_name: collection.to_string(),
                vector: embedding.to_vec(),
                limit: limit as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Include(PayloadIncludeSelector {
                        fields: vec![output_field.to_string()],
                    })),
                }),
                ..Default::default()
            })
            .await
            .map_err(|e| PipelineError::Retrieval(format!("Failed to search points: {}", e)))?;

        let hits = search_result
            .result
            .into_iter()
            .map(|point| SearchHit {
                text: point
                    .payload
                    .get(output_field)
                    .and_then(qdrant_value_to_string)
                    .unwrap_or_default(),
                score: point.score,
            })
            .collect();

        Ok(hits)
    }
}

fn qdrant_value_to_string(value: &QdrantValue) -> Option<String> {
    value.kind.as_ref().and_then(|kind| match kind {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    })
}
