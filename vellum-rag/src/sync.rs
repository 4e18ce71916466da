//! Syncing external document sources into a collection.
//!
//! A [`SyncableSource`] reports a version per document; the diff
//! engine compares those against the stored version metadata and
//! applies the difference one document at a time, so a crash mid-sync
//! leaves every document either fully old or fully new. SQL-backed
//! stores wrap each document's delete + ingest in one transaction.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tracing::info;
use vellum_types::{LlmError, Result};

use crate::collection::CollectionPath;
use crate::engine::{DocumentChunk, RagEngine};
use crate::principal::PrincipalId;

/// Metadata key for the stored content hash.
const META_CONTENT_HASH: &str = "content_hash";
/// Metadata key for the stored etag.
const META_ETAG: &str = "etag";
/// Metadata key for the stored last-modified stamp.
const META_LAST_MODIFIED: &str = "last_modified";

/// Version fingerprint of one source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentVersion {
    /// Hash of the document content.
    pub content_hash: String,
    /// Source modification time (unix seconds), when known.
    pub timestamp: Option<i64>,
    /// Source etag, when the backend provides one.
    pub etag: Option<String>,
}

impl DocumentVersion {
    /// Whether the stored metadata matches this version.
    ///
    /// The etag wins when both sides carry one; otherwise the content
    /// hash decides.
    fn matches(&self, stored: &BTreeMap<String, String>) -> bool {
        if let (Some(etag), Some(stored_etag)) = (&self.etag, stored.get(META_ETAG)) {
            return etag == stored_etag;
        }
        stored.get(META_CONTENT_HASH) == Some(&self.content_hash)
    }

    fn stamp(&self, metadata: &mut BTreeMap<String, String>) {
        metadata.insert(META_CONTENT_HASH.into(), self.content_hash.clone());
        if let Some(etag) = &self.etag {
            metadata.insert(META_ETAG.into(), etag.clone());
        }
        if let Some(ts) = self.timestamp {
            metadata.insert(META_LAST_MODIFIED.into(), ts.to_string());
        }
    }
}

/// An external system documents can be pulled from.
#[async_trait]
pub trait SyncableSource: Send + Sync {
    /// The ids of every document currently in the source.
    async fn list_documents(&self) -> Result<Vec<String>>;

    /// The current version of one document.
    async fn version(&self, document_id: &str) -> Result<DocumentVersion>;

    /// The document's chunks, ready for ingest.
    async fn fetch(&self, document_id: &str) -> Result<Vec<DocumentChunk>>;
}

/// What a sync run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Documents ingested for the first time.
    pub added: Vec<String>,
    /// Documents re-ingested because their version changed.
    pub updated: Vec<String>,
    /// Documents left alone.
    pub unchanged: Vec<String>,
    /// Documents deleted because the source no longer has them.
    pub removed: Vec<String>,
}

impl RagEngine {
    /// Sync a source into a leaf collection.
    ///
    /// Computes Added/Updated/Unchanged/Removed per document and
    /// applies each document's change atomically (delete-old plus
    /// ingest as one unit).
    ///
    /// # Errors
    ///
    /// [`LlmError::Validation`] for unknown or non-leaf collections;
    /// source and storage errors propagate, leaving already-processed
    /// documents in place.
    pub async fn sync(
        &self,
        path: &str,
        source: &dyn SyncableSource,
        base_metadata: BTreeMap<String, String>,
        readable_by: BTreeSet<PrincipalId>,
    ) -> Result<SyncReport> {
        let parsed = CollectionPath::parse(path)?;
        let collection = self
            .collection(&parsed)?
            .ok_or_else(|| LlmError::Validation(format!("unknown collection '{parsed}'")))?;
        if !collection.is_leaf {
            return Err(LlmError::Validation(format!(
                "collection '{parsed}' is not a leaf"
            )));
        }

        let source_ids = source.list_documents().await?;
        let stored_ids = self.document_ids(path).await?;
        let mut report = SyncReport::default();

        for document_id in &source_ids {
            let version = source.version(document_id).await?;
            let stored = self
                .document_metadata(collection.id, document_id)
                .await?;

            match stored {
                Some(metadata) if version.matches(&metadata) => {
                    report.unchanged.push(document_id.clone());
                }
                stored => {
                    let chunks = source.fetch(document_id).await?;
                    let mut metadata = base_metadata.clone();
                    version.stamp(&mut metadata);
                    self.ingest(path, document_id, chunks, metadata, readable_by.clone())
                        .await?;
                    if stored.is_some() {
                        report.updated.push(document_id.clone());
                    } else {
                        report.added.push(document_id.clone());
                    }
                }
            }
        }

        for stale in stored_ids.iter().filter(|id| !source_ids.contains(id)) {
            self.delete_document(path, stale).await?;
            report.removed.push(stale.clone());
        }

        info!(
            collection = %parsed,
            added = report.added.len(),
            updated = report.updated.len(),
            unchanged = report.unchanged.len(),
            removed = report.removed.len(),
            "sync complete"
        );
        Ok(report)
    }
}
