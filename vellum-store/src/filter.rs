//! Metadata filter algebra.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A predicate over a record's metadata map.
///
/// Absent keys never match: `Equals`, `Contains`, and `In` are false
/// when the key is missing, so `Not(Equals(k, v))` matches records
/// without `k` at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Matches everything.
    All,
    /// Key exists and equals the value exactly.
    Equals(String, String),
    /// Key exists and contains the substring.
    Contains(String, String),
    /// Key exists (any value).
    HasKey(String),
    /// Key exists and equals one of the values.
    In(String, Vec<String>),
    /// Every sub-filter matches.
    And(Vec<Filter>),
    /// At least one sub-filter matches.
    Or(Vec<Filter>),
    /// The sub-filter does not match.
    Not(Box<Filter>),
}

impl Filter {
    /// Convenience constructor for `Equals`.
    #[must_use]
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals(key.into(), value.into())
    }

    /// Evaluate against a metadata map.
    #[must_use]
    pub fn matches(&self, metadata: &BTreeMap<String, String>) -> bool {
        match self {
            Self::All => true,
            Self::Equals(key, value) => metadata.get(key) == Some(value),
            Self::Contains(key, sub) => {
                metadata.get(key).is_some_and(|v| v.contains(sub.as_str()))
            }
            Self::HasKey(key) => metadata.contains_key(key),
            Self::In(key, values) => metadata.get(key).is_some_and(|v| values.contains(v)),
            Self::And(filters) => filters.iter().all(|f| f.matches(metadata)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(metadata)),
            Self::Not(filter) => !filter.matches(metadata),
        }
    }
}
