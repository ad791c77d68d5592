//! The symmetric toggle shared by explicit requests and observed role removals.

use crate::models::RoleSet;
use crate::sf::RoleId;

/// Flips each requested role in turn against the evolving set: present roles are
/// removed, absent ones appended.
///
/// Every flip sees the result of the previous one, so a role requested twice ends
/// where it started. With no duplicates in `requested`, applying the same toggle
/// twice restores the original set.
pub fn toggle(current: &RoleSet, requested: &[RoleId]) -> RoleSet {
    let mut working = current.clone();

    for &id in requested {
        working.flip(id);
    }

    working
}

/// Roles in `before` that are missing from `after`, in `before` order
pub fn removed_roles(before: &[RoleId], after: &[RoleId]) -> Vec<RoleId> {
    let mut removed = Vec::new();

    for &id in before {
        if !after.contains(&id) && !removed.contains(&id) {
            removed.push(id);
        }
    }

    removed
}
