//! Stored records and scored search results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One stored embedding with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique record id.
    pub id: String,
    /// The embedding. All records in a store share one dimension,
    /// enforced at query time.
    pub embedding: Vec<f32>,
    /// Original text, when kept.
    pub content: Option<String>,
    /// String metadata used by filters.
    pub metadata: BTreeMap<String, String>,
}

impl VectorRecord {
    /// Create a record without content or metadata.
    #[must_use]
    pub fn new(id: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            embedding,
            content: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Attach one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A record with its similarity score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// The matching record.
    pub record: VectorRecord,
    /// Cosine similarity mapped to `[0, 1]` via `(1 + cos) / 2`.
    pub score: f64,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of stored records.
    pub count: usize,
    /// Embedding dimension of the stored records, when uniform.
    pub dimension: Option<usize>,
}
