//! Principals: users and groups as signed integer ids.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A non-zero principal id: positive for users, negative for groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(i64);

impl PrincipalId {
    /// Wrap a raw id.
    ///
    /// Returns `None` for zero, which is not a valid principal.
    #[must_use]
    pub fn new(id: i64) -> Option<Self> {
        (id != 0).then_some(Self(id))
    }

    /// A user principal (positive id).
    #[must_use]
    pub fn user(id: u32) -> Self {
        Self(i64::from(id.max(1)))
    }

    /// A group principal (negative id).
    #[must_use]
    pub fn group(id: u32) -> Self {
        Self(-i64::from(id.max(1)))
    }

    /// The raw signed id.
    #[must_use]
    pub fn raw(&self) -> i64 {
        self.0
    }

    /// Whether this is a user (positive) id.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.0 > 0
    }

    /// Whether this is a group (negative) id.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.0 < 0
    }
}

/// What a caller is allowed to see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAuthorization {
    /// The caller's principal ids (their user id plus group ids).
    pub principal_ids: BTreeSet<PrincipalId>,
    /// Admins bypass all permission checks.
    pub is_admin: bool,
}

impl UserAuthorization {
    /// Authorization for one user with optional groups.
    #[must_use]
    pub fn for_user(user: PrincipalId, groups: impl IntoIterator<Item = PrincipalId>) -> Self {
        let mut principal_ids: BTreeSet<PrincipalId> = groups.into_iter().collect();
        principal_ids.insert(user);
        Self {
            principal_ids,
            is_admin: false,
        }
    }

    /// An administrator.
    #[must_use]
    pub fn admin() -> Self {
        Self {
            principal_ids: BTreeSet::new(),
            is_admin: true,
        }
    }

    /// Whether any of the caller's principals appears in `allowed`.
    #[must_use]
    pub fn intersects(&self, allowed: &BTreeSet<PrincipalId>) -> bool {
        self.principal_ids.iter().any(|p| allowed.contains(p))
    }
}
