//! Collection paths, the hierarchy registry, and query patterns.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use vellum_types::LlmError;

use crate::principal::{PrincipalId, UserAuthorization};

/// A validated `/`-joined collection path.
///
/// Segments match `[A-Za-z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Parse and validate a path.
    ///
    /// # Errors
    ///
    /// [`LlmError::Validation`] for empty paths or illegal segment
    /// characters.
    pub fn parse(path: &str) -> Result<Self, LlmError> {
        if path.is_empty() {
            return Err(LlmError::Validation("collection path is empty".into()));
        }
        for segment in path.split('/') {
            if segment.is_empty()
                || !segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(LlmError::Validation(format!(
                    "invalid collection path segment '{segment}' in '{path}'"
                )));
            }
        }
        Ok(Self(path.to_string()))
    }

    /// The path as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The parent path, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0.rsplit_once('/').map(|(parent, _)| Self(parent.to_string()))
    }

    /// All ancestor paths, nearest first.
    #[must_use]
    pub fn ancestors(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(p) = current {
            current = p.parent();
            out.push(p);
        }
        out
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A node in the collection tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Numeric id, unique within the registry.
    pub id: i64,
    /// Full path.
    pub path: CollectionPath,
    /// Parent path (None at the root).
    pub parent_path: Option<CollectionPath>,
    /// Principals allowed to query. Empty means public.
    pub queryable_by: BTreeSet<PrincipalId>,
    /// Whether documents may live here (no children).
    pub is_leaf: bool,
    /// Free-form metadata.
    pub metadata: BTreeMap<String, String>,
}

impl Collection {
    /// Whether anyone may query (no principal restriction).
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.queryable_by.is_empty()
    }

    /// Whether this caller may query this collection (ignoring
    /// ancestors; see [`CollectionRegistry::accessible`] for the
    /// hierarchy-aware check).
    #[must_use]
    pub fn can_query(&self, auth: &UserAuthorization) -> bool {
        self.is_public() || auth.is_admin || auth.intersects(&self.queryable_by)
    }
}

/// A matcher over collection paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionPattern {
    /// One collection by exact path.
    Exact(CollectionPath),
    /// Direct children of a path (`prefix/*`).
    ImmediateChildren(CollectionPath),
    /// Everything under a path (`prefix/**`).
    AllDescendants(CollectionPath),
    /// Every collection (`*`).
    All,
}

impl CollectionPattern {
    /// Parse a pattern string.
    ///
    /// # Errors
    ///
    /// [`LlmError::Validation`] when the prefix part is not a valid
    /// path.
    pub fn parse(pattern: &str) -> Result<Self, LlmError> {
        if pattern == "*" {
            return Ok(Self::All);
        }
        if let Some(prefix) = pattern.strip_suffix("/**") {
            return Ok(Self::AllDescendants(CollectionPath::parse(prefix)?));
        }
        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Ok(Self::ImmediateChildren(CollectionPath::parse(prefix)?));
        }
        Ok(Self::Exact(CollectionPath::parse(pattern)?))
    }

    /// Whether the pattern matches a path.
    #[must_use]
    pub fn matches(&self, path: &CollectionPath) -> bool {
        match self {
            Self::Exact(exact) => exact == path,
            Self::ImmediateChildren(prefix) => {
                path.parent().as_ref() == Some(prefix)
            }
            Self::AllDescendants(prefix) => path
                .as_str()
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/')),
            Self::All => true,
        }
    }
}

/// The collection tree, keyed by path.
///
/// Registering a path creates any missing ancestors as public,
/// non-leaf nodes; a node stops being a leaf the moment it gains a
/// child.
#[derive(Debug, Default)]
pub struct CollectionRegistry {
    by_path: BTreeMap<CollectionPath, Collection>,
    next_id: i64,
}

impl CollectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection, creating missing ancestors.
    ///
    /// Re-registering an existing path updates its `queryable_by` and
    /// metadata in place.
    ///
    /// # Errors
    ///
    /// [`LlmError::Validation`] for invalid paths.
    pub fn register(
        &mut self,
        path: &str,
        queryable_by: BTreeSet<PrincipalId>,
        metadata: BTreeMap<String, String>,
    ) -> Result<&Collection, LlmError> {
        let path = CollectionPath::parse(path)?;

        for ancestor in path.ancestors().into_iter().rev() {
            if !self.by_path.contains_key(&ancestor) {
                let node = Collection {
                    id: self.bump_id(),
                    parent_path: ancestor.parent(),
                    path: ancestor.clone(),
                    queryable_by: BTreeSet::new(),
                    is_leaf: false,
                    metadata: BTreeMap::new(),
                };
                self.by_path.insert(ancestor, node);
            } else if let Some(node) = self.by_path.get_mut(&ancestor) {
                node.is_leaf = false;
            }
        }

        let has_children = self
            .by_path
            .keys()
            .any(|p| p.parent().as_ref() == Some(&path));

        match self.by_path.get_mut(&path) {
            Some(existing) => {
                existing.queryable_by = queryable_by;
                existing.metadata = metadata;
            }
            None => {
                let node = Collection {
                    id: self.bump_id(),
                    parent_path: path.parent(),
                    path: path.clone(),
                    queryable_by,
                    is_leaf: !has_children,
                    metadata,
                };
                self.by_path.insert(path.clone(), node);
            }
        }
        Ok(&self.by_path[&path])
    }

    fn bump_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Fetch a collection by path.
    #[must_use]
    pub fn get(&self, path: &CollectionPath) -> Option<&Collection> {
        self.by_path.get(path)
    }

    /// All collections, path order.
    pub fn iter(&self) -> impl Iterator<Item = &Collection> {
        self.by_path.values()
    }

    /// Whether the caller can query a collection, requiring every
    /// ancestor to pass as well as the collection itself.
    #[must_use]
    pub fn is_accessible(&self, path: &CollectionPath, auth: &UserAuthorization) -> bool {
        let Some(collection) = self.by_path.get(path) else {
            return false;
        };
        if !collection.can_query(auth) {
            return false;
        }
        path.ancestors().iter().all(|ancestor| {
            self.by_path
                .get(ancestor)
                .is_none_or(|node| node.can_query(auth))
        })
    }

    /// Resolve a pattern to the accessible leaf collections.
    #[must_use]
    pub fn resolve_accessible(
        &self,
        pattern: &CollectionPattern,
        auth: &UserAuthorization,
    ) -> Vec<&Collection> {
        self.by_path
            .values()
            .filter(|c| c.is_leaf)
            .filter(|c| pattern.matches(&c.path))
            .filter(|c| self.is_accessible(&c.path, auth))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principals(ids: &[i64]) -> BTreeSet<PrincipalId> {
        ids.iter().filter_map(|&i| PrincipalId::new(i)).collect()
    }

    #[test]
    fn path_validation() {
        assert!(CollectionPath::parse("confluence/EN").is_ok());
        assert!(CollectionPath::parse("a_b-c/d2").is_ok());
        assert!(CollectionPath::parse("").is_err());
        assert!(CollectionPath::parse("a//b").is_err());
        assert!(CollectionPath::parse("a/b c").is_err());
        assert!(CollectionPath::parse("a/b.c").is_err());
    }

    #[test]
    fn ancestors_nearest_first() {
        let path = CollectionPath::parse("a/b/c").unwrap();
        let ancestors: Vec<String> =
            path.ancestors().iter().map(|p| p.as_str().to_string()).collect();
        assert_eq!(ancestors, vec!["a/b", "a"]);
    }

    #[test]
    fn register_creates_public_ancestors() {
        let mut registry = CollectionRegistry::new();
        registry
            .register("confluence/EN", principals(&[1]), BTreeMap::new())
            .unwrap();
        let root = registry
            .get(&CollectionPath::parse("confluence").unwrap())
            .unwrap();
        assert!(root.is_public());
        assert!(!root.is_leaf);
        let leaf = registry
            .get(&CollectionPath::parse("confluence/EN").unwrap())
            .unwrap();
        assert!(leaf.is_leaf);
    }

    #[test]
    fn adding_a_child_demotes_the_parent_leaf() {
        let mut registry = CollectionRegistry::new();
        registry.register("docs", principals(&[]), BTreeMap::new()).unwrap();
        assert!(registry.get(&CollectionPath::parse("docs").unwrap()).unwrap().is_leaf);
        registry
            .register("docs/api", principals(&[]), BTreeMap::new())
            .unwrap();
        assert!(!registry.get(&CollectionPath::parse("docs").unwrap()).unwrap().is_leaf);
        assert!(registry.get(&CollectionPath::parse("docs/api").unwrap()).unwrap().is_leaf);
    }

    #[test]
    fn can_query_rules() {
        let mut registry = CollectionRegistry::new();
        registry
            .register("private/team", principals(&[1, -7]), BTreeMap::new())
            .unwrap();
        let path = CollectionPath::parse("private/team").unwrap();
        let collection = registry.get(&path).unwrap();

        let user1 = UserAuthorization::for_user(PrincipalId::user(1), []);
        let user2 = UserAuthorization::for_user(PrincipalId::user(2), []);
        let group7 = UserAuthorization::for_user(PrincipalId::user(9), [PrincipalId::group(7)]);

        assert!(collection.can_query(&user1));
        assert!(!collection.can_query(&user2));
        assert!(collection.can_query(&group7));
        assert!(collection.can_query(&UserAuthorization::admin()));
    }

    #[test]
    fn ancestor_permissions_are_anded() {
        let mut registry = CollectionRegistry::new();
        // Restricted root, public-looking child.
        registry
            .register("secret", principals(&[1]), BTreeMap::new())
            .unwrap();
        registry
            .register("secret/child", principals(&[]), BTreeMap::new())
            .unwrap();

        let path = CollectionPath::parse("secret/child").unwrap();
        let insider = UserAuthorization::for_user(PrincipalId::user(1), []);
        let outsider = UserAuthorization::for_user(PrincipalId::user(2), []);

        // The child itself is public, but the restricted ancestor
        // blocks the outsider.
        assert!(registry.is_accessible(&path, &insider));
        assert!(!registry.is_accessible(&path, &outsider));
        assert!(registry.is_accessible(&path, &UserAuthorization::admin()));
    }

    #[test]
    fn pattern_parsing_and_matching() {
        let all = CollectionPattern::parse("*").unwrap();
        let children = CollectionPattern::parse("docs/*").unwrap();
        let descendants = CollectionPattern::parse("docs/**").unwrap();
        let exact = CollectionPattern::parse("docs/api").unwrap();

        let api = CollectionPath::parse("docs/api").unwrap();
        let deep = CollectionPath::parse("docs/api/v2").unwrap();
        let other = CollectionPath::parse("blog").unwrap();

        assert!(all.matches(&api) && all.matches(&other));
        assert!(children.matches(&api));
        assert!(!children.matches(&deep));
        assert!(descendants.matches(&api));
        assert!(descendants.matches(&deep));
        assert!(!descendants.matches(&other));
        assert!(exact.matches(&api));
        assert!(!exact.matches(&deep));
    }

    #[test]
    fn resolve_accessible_filters_to_leaves() {
        let mut registry = CollectionRegistry::new();
        registry
            .register("docs/api", principals(&[]), BTreeMap::new())
            .unwrap();
        registry
            .register("docs/internal", principals(&[1]), BTreeMap::new())
            .unwrap();

        let outsider = UserAuthorization::for_user(PrincipalId::user(2), []);
        let resolved =
            registry.resolve_accessible(&CollectionPattern::parse("docs/**").unwrap(), &outsider);
        let paths: Vec<&str> = resolved.iter().map(|c| c.path.as_str()).collect();
        // Only the public leaf; "docs" itself is not a leaf.
        assert_eq!(paths, vec!["docs/api"]);
    }
}
