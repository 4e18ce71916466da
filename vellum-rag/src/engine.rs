//! Ingest and permission-filtered query over the vector store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};
use vellum_store::{Filter, ScoredRecord, VectorRecord, VectorStore};
use vellum_types::{LlmError, Result};

use crate::collection::{Collection, CollectionPath, CollectionPattern, CollectionRegistry};
use crate::principal::{PrincipalId, UserAuthorization};

/// Metadata key holding the owning collection id.
pub(crate) const META_COLLECTION_ID: &str = "collection_id";
/// Metadata key holding the source document id.
pub(crate) const META_DOCUMENT_ID: &str = "document_id";
/// Metadata key holding the comma-delimited reader principals.
pub(crate) const META_READABLE_BY: &str = "readable_by";

/// One chunk of a document ready for ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    /// The chunk text.
    pub content: String,
    /// Its embedding.
    pub embedding: Vec<f32>,
}

/// Render reader principals as a delimited string the filter algebra
/// can test with `Contains`: `,1,5,-3,` - empty string means public.
fn encode_readable_by(readable_by: &BTreeSet<PrincipalId>) -> String {
    if readable_by.is_empty() {
        return String::new();
    }
    let ids: Vec<String> = readable_by.iter().map(|p| p.raw().to_string()).collect();
    format!(",{},", ids.join(","))
}

/// Permission clause for a non-admin caller: public rows, or rows
/// listing one of the caller's principals.
fn permission_filter(auth: &UserAuthorization) -> Filter {
    let mut clauses = vec![Filter::Equals(META_READABLE_BY.into(), String::new())];
    for principal in &auth.principal_ids {
        clauses.push(Filter::Contains(
            META_READABLE_BY.into(),
            format!(",{},", principal.raw()),
        ));
    }
    Filter::Or(clauses)
}

/// Permissioned retrieval engine: a collection registry plus a vector
/// store holding the chunks.
pub struct RagEngine {
    store: Arc<dyn VectorStore>,
    collections: RwLock<CollectionRegistry>,
}

impl RagEngine {
    /// Create an engine over a store.
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            collections: RwLock::new(CollectionRegistry::new()),
        }
    }

    /// Register a collection (see [`CollectionRegistry::register`]).
    ///
    /// # Errors
    ///
    /// Path validation errors.
    pub fn register_collection(
        &self,
        path: &str,
        queryable_by: BTreeSet<PrincipalId>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Collection> {
        let mut registry = self
            .collections
            .write()
            .map_err(|_| LlmError::Unknown {
                message: "collection registry lock poisoned".into(),
                source: None,
            })?;
        registry.register(path, queryable_by, metadata).cloned()
    }

    fn with_registry<T>(&self, f: impl FnOnce(&CollectionRegistry) -> T) -> Result<T> {
        let registry = self.collections.read().map_err(|_| LlmError::Unknown {
            message: "collection registry lock poisoned".into(),
            source: None,
        })?;
        Ok(f(&registry))
    }

    /// The chunk id for `(collection, document, index)`.
    ///
    /// The collection id is baked in so identical document ids in
    /// different collections can never overwrite each other.
    #[must_use]
    pub fn chunk_id(collection_id: i64, document_id: &str, index: usize) -> String {
        format!("coll-{collection_id}-{document_id}-chunk-{index}")
    }

    /// Ingest a document's chunks into a leaf collection.
    ///
    /// Replaces any prior version of the document (stale chunks beyond
    /// the new count are deleted). Returns the number of chunks stored.
    ///
    /// # Errors
    ///
    /// [`LlmError::Validation`] for unknown or non-leaf collections;
    /// storage errors propagate.
    pub async fn ingest(
        &self,
        path: &str,
        document_id: &str,
        chunks: Vec<DocumentChunk>,
        metadata: BTreeMap<String, String>,
        readable_by: BTreeSet<PrincipalId>,
    ) -> Result<usize> {
        let path = CollectionPath::parse(path)?;
        let collection = self
            .with_registry(|r| r.get(&path).cloned())?
            .ok_or_else(|| {
                LlmError::Validation(format!("unknown collection '{path}'"))
            })?;
        if !collection.is_leaf {
            return Err(LlmError::Validation(format!(
                "collection '{path}' is not a leaf; documents belong in leaf collections"
            )));
        }

        // Drop the previous version of this document first.
        let prefix = format!("coll-{}-{document_id}-chunk-", collection.id);
        self.store.delete_by_prefix(&prefix).await?;

        let readable = encode_readable_by(&readable_by);
        let count = chunks.len();
        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .enumerate()
            .map(|(idx, chunk)| {
                let mut meta = metadata.clone();
                meta.insert(META_COLLECTION_ID.into(), collection.id.to_string());
                meta.insert(META_DOCUMENT_ID.into(), document_id.to_string());
                meta.insert(META_READABLE_BY.into(), readable.clone());
                VectorRecord {
                    id: Self::chunk_id(collection.id, document_id, idx),
                    embedding: chunk.embedding,
                    content: Some(chunk.content),
                    metadata: meta,
                }
            })
            .collect();
        self.store.upsert_batch(records).await?;

        info!(collection = %path, document = document_id, chunks = count, "ingested document");
        Ok(count)
    }

    /// Delete a document from the named collection only.
    ///
    /// Returns the number of chunks removed.
    ///
    /// # Errors
    ///
    /// [`LlmError::Validation`] for unknown collections.
    pub async fn delete_document(&self, path: &str, document_id: &str) -> Result<usize> {
        let path = CollectionPath::parse(path)?;
        let collection = self
            .with_registry(|r| r.get(&path).cloned())?
            .ok_or_else(|| {
                LlmError::Validation(format!("unknown collection '{path}'"))
            })?;
        let prefix = format!("coll-{}-{document_id}-chunk-", collection.id);
        Ok(self.store.delete_by_prefix(&prefix).await?)
    }

    /// List the stored document ids in a collection.
    ///
    /// # Errors
    ///
    /// [`LlmError::Validation`] for unknown collections.
    pub async fn document_ids(&self, path: &str) -> Result<Vec<String>> {
        let path = CollectionPath::parse(path)?;
        let collection = self
            .with_registry(|r| r.get(&path).cloned())?
            .ok_or_else(|| {
                LlmError::Validation(format!("unknown collection '{path}'"))
            })?;
        let filter = Filter::equals(META_COLLECTION_ID, collection.id.to_string());
        let records = self.store.list(Some(&filter), usize::MAX, 0).await?;
        let mut ids: Vec<String> = records
            .into_iter()
            .filter_map(|r| r.metadata.get(META_DOCUMENT_ID).cloned())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Fetch the stored metadata of a document's first chunk.
    pub(crate) async fn document_metadata(
        &self,
        collection_id: i64,
        document_id: &str,
    ) -> Result<Option<BTreeMap<String, String>>> {
        let id = Self::chunk_id(collection_id, document_id, 0);
        Ok(self.store.get(&id).await?.map(|r| r.metadata))
    }

    /// Resolve the collection at a path, if registered.
    pub(crate) fn collection(&self, path: &CollectionPath) -> Result<Option<Collection>> {
        self.with_registry(|r| r.get(path).cloned())
    }

    /// Permission-filtered similarity search.
    ///
    /// Resolves the pattern to accessible leaf collections (every
    /// ancestor must pass), then queries with the collection and
    /// reader constraints in the metadata filter. Admins skip the
    /// reader constraint.
    ///
    /// # Errors
    ///
    /// Pattern validation and storage errors.
    pub async fn query(
        &self,
        auth: &UserAuthorization,
        pattern: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let pattern = CollectionPattern::parse(pattern)?;
        let accessible: Vec<i64> = self.with_registry(|r| {
            r.resolve_accessible(&pattern, auth)
                .iter()
                .map(|c| c.id)
                .collect()
        })?;

        if accessible.is_empty() {
            debug!("no accessible collections for pattern");
            return Ok(Vec::new());
        }

        let collection_clause = Filter::In(
            META_COLLECTION_ID.into(),
            accessible.iter().map(i64::to_string).collect(),
        );
        let filter = if auth.is_admin {
            collection_clause
        } else {
            Filter::And(vec![collection_clause, permission_filter(auth)])
        };

        Ok(self.store.search(query_embedding, top_k, Some(&filter)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_store::InMemoryVectorStore;

    fn chunk(content: &str, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk {
            content: content.into(),
            embedding,
        }
    }

    fn engine() -> RagEngine {
        RagEngine::new(Arc::new(InMemoryVectorStore::new()))
    }

    #[tokio::test]
    async fn ingest_requires_leaf_collection() {
        let engine = engine();
        engine
            .register_collection("docs/api", BTreeSet::new(), BTreeMap::new())
            .unwrap();
        let err = engine
            .ingest("docs", "d1", vec![chunk("x", vec![1.0])], BTreeMap::new(), BTreeSet::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a leaf"));

        let stored = engine
            .ingest("docs/api", "d1", vec![chunk("x", vec![1.0])], BTreeMap::new(), BTreeSet::new())
            .await
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn chunk_ids_scope_by_collection() {
        let engine = engine();
        engine
            .register_collection("a", BTreeSet::new(), BTreeMap::new())
            .unwrap();
        engine
            .register_collection("b", BTreeSet::new(), BTreeMap::new())
            .unwrap();
        engine
            .ingest("a", "doc", vec![chunk("in a", vec![1.0, 0.0])], BTreeMap::new(), BTreeSet::new())
            .await
            .unwrap();
        engine
            .ingest("b", "doc", vec![chunk("in b", vec![0.0, 1.0])], BTreeMap::new(), BTreeSet::new())
            .await
            .unwrap();

        // Same document id, different collections, both survive.
        let auth = UserAuthorization::admin();
        let results = engine.query(&auth, "*", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(results.len(), 2);

        // Deleting from one collection leaves the other intact.
        assert_eq!(engine.delete_document("a", "doc").await.unwrap(), 1);
        let results = engine.query(&auth, "*", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].record.content.as_deref() == Some("in b"));
    }

    #[tokio::test]
    async fn reingest_replaces_stale_chunks() {
        let engine = engine();
        engine
            .register_collection("docs", BTreeSet::new(), BTreeMap::new())
            .unwrap();
        engine
            .ingest(
                "docs",
                "d1",
                vec![chunk("one", vec![1.0]), chunk("two", vec![1.0]), chunk("three", vec![1.0])],
                BTreeMap::new(),
                BTreeSet::new(),
            )
            .await
            .unwrap();
        engine
            .ingest("docs", "d1", vec![chunk("only", vec![1.0])], BTreeMap::new(), BTreeSet::new())
            .await
            .unwrap();

        let results = engine
            .query(&UserAuthorization::admin(), "docs", &[1.0], 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.content.as_deref(), Some("only"));
    }

    #[tokio::test]
    async fn query_enforces_collection_permissions() {
        let engine = engine();
        let user1: BTreeSet<PrincipalId> = [PrincipalId::user(1)].into_iter().collect();
        engine
            .register_collection("confluence/EN", user1, BTreeMap::new())
            .unwrap();
        engine
            .ingest(
                "confluence/EN",
                "handbook",
                vec![chunk("the handbook", vec![1.0, 0.0])],
                BTreeMap::new(),
                BTreeSet::new(),
            )
            .await
            .unwrap();

        let outsider = UserAuthorization::for_user(PrincipalId::user(2), []);
        let results = engine
            .query(&outsider, "confluence/**", &[1.0, 0.0], 10)
            .await
            .unwrap();
        assert!(results.is_empty());

        let insider = UserAuthorization::for_user(PrincipalId::user(1), []);
        let results = engine
            .query(&insider, "confluence/**", &[1.0, 0.0], 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].record.metadata.get(META_DOCUMENT_ID).unwrap(),
            "handbook"
        );
    }

    #[tokio::test]
    async fn document_level_readers_filter_rows() {
        let engine = engine();
        engine
            .register_collection("docs", BTreeSet::new(), BTreeMap::new())
            .unwrap();
        let readers: BTreeSet<PrincipalId> =
            [PrincipalId::user(1), PrincipalId::group(9)].into_iter().collect();
        engine
            .ingest("docs", "restricted", vec![chunk("secret", vec![1.0])], BTreeMap::new(), readers)
            .await
            .unwrap();
        engine
            .ingest("docs", "open", vec![chunk("public", vec![1.0])], BTreeMap::new(), BTreeSet::new())
            .await
            .unwrap();

        let outsider = UserAuthorization::for_user(PrincipalId::user(2), []);
        let results = engine.query(&outsider, "docs", &[1.0], 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.content.as_deref(), Some("public"));

        let group_member =
            UserAuthorization::for_user(PrincipalId::user(3), [PrincipalId::group(9)]);
        let results = engine.query(&group_member, "docs", &[1.0], 10).await.unwrap();
        assert_eq!(results.len(), 2);

        let admin = UserAuthorization::admin();
        let results = engine.query(&admin, "docs", &[1.0], 10).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn similar_principal_ids_do_not_collide() {
        // Reader id 1 must not grant reader id 12 (substring hazard).
        let engine = engine();
        engine
            .register_collection("docs", BTreeSet::new(), BTreeMap::new())
            .unwrap();
        let readers: BTreeSet<PrincipalId> = [PrincipalId::user(12)].into_iter().collect();
        engine
            .ingest("docs", "d", vec![chunk("x", vec![1.0])], BTreeMap::new(), readers)
            .await
            .unwrap();

        let user1 = UserAuthorization::for_user(PrincipalId::user(1), []);
        assert!(engine.query(&user1, "docs", &[1.0], 10).await.unwrap().is_empty());
        let user12 = UserAuthorization::for_user(PrincipalId::user(12), []);
        assert_eq!(engine.query(&user12, "docs", &[1.0], 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_pattern_targets_return_empty() {
        let engine = engine();
        let auth = UserAuthorization::admin();
        let results = engine.query(&auth, "nope/**", &[1.0], 5).await.unwrap();
        assert!(results.is_empty());
    }
}
