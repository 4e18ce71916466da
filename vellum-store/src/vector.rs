//! The vector store contract and its in-memory reference
//! implementation.
//!
//! SQL-backed implementations mirror this layout:
//! `vectors(id TEXT PK, embedding, embedding_dim INT, content TEXT,
//! metadata JSON, collection_id INT, readable_by INT[])` with an
//! ANN index on `embedding` and array indexes on the permission
//! columns. The trait is what the RAG layer programs against.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;
use vellum_types::StoreError;

use crate::filter::Filter;
use crate::record::{ScoredRecord, StoreStats, VectorRecord};

/// CRUD plus similarity search over embedding records.
///
/// Implementations follow a multiple-readers/single-writer contract;
/// writes are idempotent by id (upsert semantics). `close` is
/// idempotent and releases backend resources.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace one record.
    async fn upsert(&self, record: VectorRecord) -> Result<(), StoreError>;

    /// Insert or replace many records.
    async fn upsert_batch(&self, records: Vec<VectorRecord>) -> Result<(), StoreError>;

    /// Fetch a record by id.
    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, StoreError>;

    /// Fetch many records by id, position-aligned with the input.
    async fn get_batch(&self, ids: &[String]) -> Result<Vec<Option<VectorRecord>>, StoreError>;

    /// Delete by id; returns whether a record existed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Delete many ids; returns how many existed.
    async fn delete_batch(&self, ids: &[String]) -> Result<usize, StoreError>;

    /// Delete every record whose id starts with the prefix.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize, StoreError>;

    /// Delete every record matching the filter.
    async fn delete_by_filter(&self, filter: &Filter) -> Result<usize, StoreError>;

    /// Remove all records.
    async fn clear(&self) -> Result<(), StoreError>;

    /// List records in insertion order, filtered and paginated.
    async fn list(
        &self,
        filter: Option<&Filter>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<VectorRecord>, StoreError>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Aggregate statistics.
    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Nearest records to the query embedding, best first.
    ///
    /// Scores are cosine similarity mapped to `[0, 1]`; equal scores
    /// keep insertion order. An empty store returns an empty vector.
    ///
    /// # Errors
    ///
    /// [`StoreError::DimensionMismatch`] as soon as a record's
    /// dimension differs from the query's.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredRecord>, StoreError>;

    /// Release resources. Idempotent.
    async fn close(&self) -> Result<(), StoreError>;
}

/// Cosine similarity mapped to `[0, 1]` via `(1 + cos) / 2`.
///
/// Zero-magnitude vectors score 0.5 (cosine treated as 0).
#[must_use]
pub fn cosine_score(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    let cos = if denom == 0.0 { 0.0 } else { dot / denom };
    ((1.0 + cos) / 2.0).clamp(0.0, 1.0)
}

#[derive(Default)]
struct Inner {
    /// Records in insertion order; upserts replace in place so ties
    /// keep the original order.
    records: Vec<VectorRecord>,
    by_id: HashMap<String, usize>,
}

/// In-memory reference store: a `Vec` behind an `RwLock`, brute-force
/// scan on search.
#[derive(Default)]
pub struct InMemoryVectorStore {
    inner: RwLock<Inner>,
}

impl InMemoryVectorStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, record: VectorRecord) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        if let Some(&idx) = inner.by_id.get(&record.id) {
            inner.records[idx] = record;
        } else {
            let idx = inner.records.len();
            inner.by_id.insert(record.id.clone(), idx);
            inner.records.push(record);
        }
        Ok(())
    }

    async fn upsert_batch(&self, records: Vec<VectorRecord>) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        for record in records {
            if let Some(&idx) = inner.by_id.get(&record.id) {
                inner.records[idx] = record;
            } else {
                let idx = inner.records.len();
                inner.by_id.insert(record.id.clone(), idx);
                inner.records.push(record);
            }
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, StoreError> {
        let inner = self.read()?;
        Ok(inner.by_id.get(id).map(|&idx| inner.records[idx].clone()))
    }

    async fn get_batch(&self, ids: &[String]) -> Result<Vec<Option<VectorRecord>>, StoreError> {
        let inner = self.read()?;
        Ok(ids
            .iter()
            .map(|id| inner.by_id.get(id).map(|&idx| inner.records[idx].clone()))
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.delete_batch(&[id.to_string()]).await? == 1)
    }

    async fn delete_batch(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut inner = self.write()?;
        let before = inner.records.len();
        inner.records.retain(|r| !ids.contains(&r.id));
        rebuild_index(&mut inner);
        Ok(before - inner.records.len())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut inner = self.write()?;
        let before = inner.records.len();
        inner.records.retain(|r| !r.id.starts_with(prefix));
        rebuild_index(&mut inner);
        Ok(before - inner.records.len())
    }

    async fn delete_by_filter(&self, filter: &Filter) -> Result<usize, StoreError> {
        let mut inner = self.write()?;
        let before = inner.records.len();
        inner.records.retain(|r| !filter.matches(&r.metadata));
        rebuild_index(&mut inner);
        Ok(before - inner.records.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.records.clear();
        inner.by_id.clear();
        Ok(())
    }

    async fn list(
        &self,
        filter: Option<&Filter>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<VectorRecord>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .records
            .iter()
            .filter(|r| filter.is_none_or(|f| f.matches(&r.metadata)))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.records.len())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let inner = self.read()?;
        let mut dims = inner.records.iter().map(|r| r.embedding.len());
        let first = dims.next();
        let uniform = first.filter(|d| dims.all(|other| other == *d));
        Ok(StoreStats {
            count: inner.records.len(),
            dimension: uniform,
        })
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        let inner = self.read()?;
        let mut scored = Vec::new();
        for record in &inner.records {
            if record.embedding.len() != query.len() {
                return Err(StoreError::DimensionMismatch {
                    query: query.len(),
                    store: record.embedding.len(),
                });
            }
            if filter.is_none_or(|f| f.matches(&record.metadata)) {
                scored.push(ScoredRecord {
                    record: record.clone(),
                    score: cosine_score(query, &record.embedding),
                });
            }
        }
        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        debug!(results = scored.len(), "vector search complete");
        Ok(scored)
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn rebuild_index(inner: &mut Inner) {
    inner.by_id = inner
        .records
        .iter()
        .enumerate()
        .map(|(idx, r)| (r.id.clone(), idx))
        .collect();
}
