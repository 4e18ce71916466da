#![deny(missing_docs)]
//! Storage and search primitives for retrieval.
//!
//! Three engines compose here: a [`VectorStore`] for embedding
//! similarity, a [`KeywordIndex`] for BM25-style text hits, and a
//! [`HybridSearcher`] fusing both with reciprocal-rank or weighted
//! fusion. In-memory reference implementations live alongside the
//! traits; SQL-backed variants are adapters implementing the same
//! contracts.

pub mod filter;
pub mod hybrid;
pub mod keyword;
pub mod record;
pub mod vector;

pub use filter::Filter;
pub use hybrid::{FusionStrategy, HybridMatch, HybridSearcher};
pub use keyword::{InMemoryKeywordIndex, KeywordHit, KeywordIndex};
pub use record::{ScoredRecord, StoreStats, VectorRecord};
pub use vector::{InMemoryVectorStore, VectorStore};
