//! Permission evaluation.

use super::identity::{Identity, Permission};

/// First permission in `required` that `identity` does not hold, in the
/// caller's order. `None` means every permission is held.
pub fn first_missing<'a, I: Identity>(identity: &I, required: &'a [Permission]) -> Option<&'a Permission> {
    required.iter().find(|permission| !identity.has_permission(permission))
}

/// Whether `identity` holds every permission in `required`. Vacuously true
/// for an empty list.
pub fn has_all<I: Identity>(identity: &I, required: &[Permission]) -> bool {
    first_missing(identity, required).is_none()
}
