// Retrieval-augmented prompting
//
// Short paragraphs are supplemented with passages from a vector database:
// - Query Rewriter: condense the record into one search sentence
// - Retrieval Client: embed the query and take the configured ranks
// - Augmenter: owns both models for the length of one format pass

pub mod augmenter;
pub mod embedding;
pub mod retrieval;
pub mod rewriter;
pub mod vector_db;

pub use augmenter::{should_augment, AugmentStats, Augmenter};
pub use embedding::{BertEmbedder, Embedder};
pub use retrieval::{RetrievalClient, RetrievalHint, SearchParams};
pub use rewriter::{QueryGenerator, QueryRewriter, T5Generator};
pub use vector_db::{QdrantSearch, SearchHit, VectorSearch};
