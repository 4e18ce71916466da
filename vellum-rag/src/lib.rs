#![deny(missing_docs)]
//! Permissioned retrieval over a collection hierarchy.
//!
//! Documents live in leaf [`Collection`]s arranged in a path tree.
//! Queries resolve a [`CollectionPattern`], keep only collections the
//! caller can reach (every ancestor must pass, not just the leaf), and
//! search the vector store with the permission constraints folded into
//! the metadata filter. Ingest scopes chunk ids by collection so
//! documents in different collections can never overwrite each other;
//! sync diffs a [`SyncableSource`] against stored versions.

pub mod collection;
pub mod engine;
pub mod principal;
pub mod sync;

pub use collection::{Collection, CollectionPath, CollectionPattern, CollectionRegistry};
pub use engine::{DocumentChunk, RagEngine};
pub use principal::{PrincipalId, UserAuthorization};
pub use sync::{DocumentVersion, SyncReport, SyncableSource};
