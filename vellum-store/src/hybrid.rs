//! Hybrid search: fuse vector and keyword results into one ranking.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use vellum_types::StoreError;

use crate::filter::Filter;
use crate::keyword::{KeywordHit, KeywordIndex};
use crate::record::ScoredRecord;
use crate::vector::VectorStore;

/// Default reciprocal-rank-fusion constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// How the two engines' rankings combine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FusionStrategy {
    /// Vector results only.
    VectorOnly,
    /// Keyword results only.
    KeywordOnly,
    /// Reciprocal rank fusion: `Σ 1 / (k + rank)` across engines,
    /// ranks starting at 1.
    Rrf {
        /// The rank-smoothing constant (default 60).
        k: f64,
    },
    /// Weighted sum of per-engine min-max-normalized scores, clipped
    /// to `[0, 1]`. Weights must be non-negative with a positive sum.
    WeightedScore {
        /// Weight on the normalized vector score.
        vector_weight: f64,
        /// Weight on the normalized keyword score.
        keyword_weight: f64,
    },
}

impl Default for FusionStrategy {
    fn default() -> Self {
        Self::Rrf { k: DEFAULT_RRF_K }
    }
}

/// One fused result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridMatch {
    /// Record/document id.
    pub id: String,
    /// Raw vector score, when the vector engine returned this id.
    pub vector_score: Option<f64>,
    /// Raw keyword score, when the keyword engine returned this id.
    pub keyword_score: Option<f64>,
    /// Fused score.
    pub score: f64,
    /// Content from whichever engine carried it.
    pub content: Option<String>,
    /// Metadata from whichever engine carried it.
    pub metadata: BTreeMap<String, String>,
    /// Highlight spans from the keyword engine.
    pub highlights: Option<Vec<(usize, usize)>>,
}

/// Searches both engines and fuses the rankings.
pub struct HybridSearcher {
    store: Arc<dyn VectorStore>,
    index: Arc<dyn KeywordIndex>,
}

impl HybridSearcher {
    /// Pair a vector store with a keyword index.
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, index: Arc<dyn KeywordIndex>) -> Self {
        Self { store, index }
    }

    /// Run a hybrid query.
    ///
    /// Each engine contributes its top `2 * top_k` candidates; fusion
    /// dedups by id, merging per-engine scores into one
    /// [`HybridMatch`]. Ties in the fused score break by id
    /// (ascending). The final list is truncated to `top_k`.
    ///
    /// # Errors
    ///
    /// Engine errors propagate; invalid weighted-fusion weights are
    /// [`StoreError::InvalidRecord`].
    pub async fn search(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        top_k: usize,
        filter: Option<&Filter>,
        strategy: FusionStrategy,
    ) -> Result<Vec<HybridMatch>, StoreError> {
        if let FusionStrategy::WeightedScore {
            vector_weight,
            keyword_weight,
        } = strategy
            && (vector_weight < 0.0 || keyword_weight < 0.0 || vector_weight + keyword_weight <= 0.0)
        {
            return Err(StoreError::InvalidRecord(
                "fusion weights must be non-negative with a positive sum".into(),
            ));
        }

        let pool = top_k.saturating_mul(2).max(1);
        let vector_hits = match strategy {
            FusionStrategy::KeywordOnly => Vec::new(),
            _ => self.store.search(query_embedding, pool, filter).await?,
        };
        let keyword_hits = match strategy {
            FusionStrategy::VectorOnly => Vec::new(),
            _ => self.index.search(query_text, pool, filter).await?,
        };

        let mut matches = merge_candidates(&vector_hits, &keyword_hits);

        match strategy {
            FusionStrategy::VectorOnly => {
                for m in matches.values_mut() {
                    m.score = m.vector_score.unwrap_or(0.0);
                }
            }
            FusionStrategy::KeywordOnly => {
                for m in matches.values_mut() {
                    m.score = m.keyword_score.unwrap_or(0.0);
                }
            }
            FusionStrategy::Rrf { k } => {
                apply_rrf(&mut matches, &vector_hits, &keyword_hits, k);
            }
            FusionStrategy::WeightedScore {
                vector_weight,
                keyword_weight,
            } => {
                apply_weighted(&mut matches, vector_weight, keyword_weight);
            }
        }

        let mut fused: Vec<HybridMatch> = matches.into_values().collect();
        fused.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        fused.truncate(top_k);
        debug!(results = fused.len(), "hybrid search complete");
        Ok(fused)
    }
}

/// Build the deduped candidate set keyed by id.
fn merge_candidates(
    vector_hits: &[ScoredRecord],
    keyword_hits: &[KeywordHit],
) -> BTreeMap<String, HybridMatch> {
    let mut matches: BTreeMap<String, HybridMatch> = BTreeMap::new();

    for hit in vector_hits {
        matches.insert(
            hit.record.id.clone(),
            HybridMatch {
                id: hit.record.id.clone(),
                vector_score: Some(hit.score),
                keyword_score: None,
                score: 0.0,
                content: hit.record.content.clone(),
                metadata: hit.record.metadata.clone(),
                highlights: None,
            },
        );
    }

    for hit in keyword_hits {
        let entry = matches.entry(hit.id.clone()).or_insert_with(|| HybridMatch {
            id: hit.id.clone(),
            vector_score: None,
            keyword_score: None,
            score: 0.0,
            content: None,
            metadata: hit.metadata.clone(),
            highlights: None,
        });
        entry.keyword_score = Some(hit.score);
        entry.highlights = Some(hit.highlights.clone());
        if entry.content.is_none() {
            entry.content = Some(hit.content.clone());
        }
    }

    matches
}

/// Reciprocal rank fusion: each engine contributes `1 / (k + rank)`.
fn apply_rrf(
    matches: &mut BTreeMap<String, HybridMatch>,
    vector_hits: &[ScoredRecord],
    keyword_hits: &[KeywordHit],
    k: f64,
) {
    for (rank, hit) in vector_hits.iter().enumerate() {
        if let Some(m) = matches.get_mut(&hit.record.id) {
            m.score += 1.0 / (k + (rank + 1) as f64);
        }
    }
    for (rank, hit) in keyword_hits.iter().enumerate() {
        if let Some(m) = matches.get_mut(&hit.id) {
            m.score += 1.0 / (k + (rank + 1) as f64);
        }
    }
}

/// Weighted fusion over per-engine min-max-normalized scores.
fn apply_weighted(
    matches: &mut BTreeMap<String, HybridMatch>,
    vector_weight: f64,
    keyword_weight: f64,
) {
    let vector_norm = min_max(matches.values().filter_map(|m| m.vector_score));
    let keyword_norm = min_max(matches.values().filter_map(|m| m.keyword_score));

    for m in matches.values_mut() {
        let nv = m.vector_score.map_or(0.0, |s| vector_norm.normalize(s));
        let nk = m.keyword_score.map_or(0.0, |s| keyword_norm.normalize(s));
        m.score = (vector_weight * nv + keyword_weight * nk).clamp(0.0, 1.0);
    }
}

struct MinMax {
    min: f64,
    max: f64,
}

impl MinMax {
    /// Normalize into `[0, 1]`; a degenerate range maps everything
    /// to 1.0.
    fn normalize(&self, value: f64) -> f64 {
        if self.max > self.min {
            (value - self.min) / (self.max - self.min)
        } else {
            1.0
        }
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> MinMax {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values {
        min = min.min(v);
        max = max.max(v);
    }
    MinMax { min, max }
}
