//! BM25-style keyword index with highlight spans.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vellum_types::StoreError;

use crate::filter::Filter;

/// BM25 term-frequency saturation parameter.
const K1: f64 = 1.2;
/// BM25 length-normalization parameter.
const B: f64 = 0.75;

/// A keyword search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordHit {
    /// Document id.
    pub id: String,
    /// BM25 score (non-negative, unbounded).
    pub score: f64,
    /// The indexed content.
    pub content: String,
    /// Document metadata.
    pub metadata: BTreeMap<String, String>,
    /// Byte ranges of query-term occurrences in `content`.
    pub highlights: Vec<(usize, usize)>,
}

/// Full-text search over document content.
#[async_trait]
pub trait KeywordIndex: Send + Sync {
    /// Insert or replace a document.
    async fn upsert(
        &self,
        id: &str,
        content: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), StoreError>;

    /// Delete by id; returns whether the document existed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Remove all documents.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Number of indexed documents.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Best-scoring documents for the query text.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<KeywordHit>, StoreError>;
}

/// One token with its byte span in the source text.
#[derive(Debug, Clone, PartialEq)]
struct Token {
    text: String,
    start: usize,
    end: usize,
}

/// Lowercased alphanumeric tokens with byte spans.
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, ch) in text.char_indices() {
        if ch.is_alphanumeric() {
            start.get_or_insert(idx);
        } else if let Some(s) = start.take() {
            tokens.push(Token {
                text: text[s..idx].to_lowercase(),
                start: s,
                end: idx,
            });
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            text: text[s..].to_lowercase(),
            start: s,
            end: text.len(),
        });
    }
    tokens
}

struct Doc {
    id: String,
    content: String,
    metadata: BTreeMap<String, String>,
    tokens: Vec<Token>,
    term_freq: HashMap<String, usize>,
}

#[derive(Default)]
struct Inner {
    docs: Vec<Doc>,
    by_id: HashMap<String, usize>,
}

/// In-memory BM25 index (k1 = 1.2, b = 0.75).
#[derive(Default)]
pub struct InMemoryKeywordIndex {
    inner: RwLock<Inner>,
}

impl InMemoryKeywordIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("index lock poisoned".into()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("index lock poisoned".into()))
    }
}

#[async_trait]
impl KeywordIndex for InMemoryKeywordIndex {
    async fn upsert(
        &self,
        id: &str,
        content: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let tokens = tokenize(content);
        let mut term_freq = HashMap::new();
        for token in &tokens {
            *term_freq.entry(token.text.clone()).or_insert(0) += 1;
        }
        let doc = Doc {
            id: id.to_string(),
            content: content.to_string(),
            metadata,
            tokens,
            term_freq,
        };

        let mut inner = self.write()?;
        if let Some(&idx) = inner.by_id.get(id) {
            inner.docs[idx] = doc;
        } else {
            let idx = inner.docs.len();
            inner.by_id.insert(id.to_string(), idx);
            inner.docs.push(doc);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        let existed = inner.by_id.contains_key(id);
        inner.docs.retain(|d| d.id != id);
        inner.by_id = inner
            .docs
            .iter()
            .enumerate()
            .map(|(idx, d)| (d.id.clone(), idx))
            .collect();
        Ok(existed)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.docs.clear();
        inner.by_id.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.docs.len())
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<KeywordHit>, StoreError> {
        let inner = self.read()?;
        let query_terms: Vec<String> = tokenize(query).into_iter().map(|t| t.text).collect();
        if query_terms.is_empty() || inner.docs.is_empty() {
            return Ok(Vec::new());
        }

        let doc_count = inner.docs.len() as f64;
        let avg_len = inner
            .docs
            .iter()
            .map(|d| d.tokens.len())
            .sum::<usize>() as f64
            / doc_count;

        // Document frequency per query term.
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for term in &query_terms {
            let df = inner
                .docs
                .iter()
                .filter(|d| d.term_freq.contains_key(term))
                .count();
            doc_freq.insert(term.as_str(), df);
        }

        let mut hits = Vec::new();
        for doc in &inner.docs {
            if !filter.is_none_or(|f| f.matches(&doc.metadata)) {
                continue;
            }
            let doc_len = doc.tokens.len() as f64;
            let mut score = 0.0;
            for term in &query_terms {
                let tf = *doc.term_freq.get(term).unwrap_or(&0) as f64;
                if tf == 0.0 {
                    continue;
                }
                let df = doc_freq[term.as_str()] as f64;
                let idf = (1.0 + (doc_count - df + 0.5) / (df + 0.5)).ln();
                let norm = K1 * (1.0 - B + B * doc_len / avg_len.max(f64::MIN_POSITIVE));
                score += idf * tf * (K1 + 1.0) / (tf + norm);
            }
            if score > 0.0 {
                let highlights = doc
                    .tokens
                    .iter()
                    .filter(|t| query_terms.contains(&t.text))
                    .map(|t| (t.start, t.end))
                    .collect();
                hits.push(KeywordHit {
                    id: doc.id.clone(),
                    score,
                    content: doc.content.clone(),
                    metadata: doc.metadata.clone(),
                    highlights,
                });
            }
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}
