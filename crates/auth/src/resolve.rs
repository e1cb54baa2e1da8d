//! Effective-permission resolution.
//!
//! A user's effective permission set is computed on demand from a loaded
//! [`UserSnapshot`] and never persisted. The computation is a pure set merge:
//! union of every permission reachable through assigned roles, then per-user
//! overrides applied as set add/remove. Overrides therefore win over role
//! grants regardless of iteration order.

use std::collections::BTreeSet;

use crate::{Permission, UserSnapshot};

/// Compute the effective permission set for a user snapshot.
///
/// - Role grants are unioned (duplicates collapse).
/// - `allow = true` overrides add the code (idempotent if a role already
///   grants it).
/// - `allow = false` overrides remove the code (idempotent if absent).
///
/// Denies are applied after allows, so a malformed snapshot carrying both an
/// allow and a deny for the same code still resolves deterministically (the
/// deny wins). Well-formed stores never produce that input: overrides are
/// unique per (user, permission).
///
/// Infallible and free of I/O; the same snapshot always yields the same set.
pub fn effective_permissions(snapshot: &UserSnapshot) -> BTreeSet<Permission> {
    let mut effective: BTreeSet<Permission> = snapshot
        .roles
        .iter()
        .flat_map(|grant| grant.permissions.iter().cloned())
        .collect();

    for ovr in snapshot.overrides.iter().filter(|o| o.allow) {
        effective.insert(ovr.permission.clone());
    }
    for ovr in snapshot.overrides.iter().filter(|o| !o.allow) {
        effective.remove(&ovr.permission);
    }

    effective
}
