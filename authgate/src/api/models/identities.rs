//! API response models for identities.

use serde::{Deserialize, Serialize};

use crate::auth::identity::{AuthRecord, Permission, UserId, UserType};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityResponse {
    pub user_id: UserId,
    pub user_type: UserType,
    /// Permissions the identity holds, sorted by name. Entries mapped to `false` are omitted.
    pub permissions: Vec<Permission>,
}

impl From<AuthRecord> for IdentityResponse {
    fn from(record: AuthRecord) -> Self {
        Self {
            permissions: record.permissions.held().cloned().collect(),
            user_id: record.user_id,
            user_type: record.user_type,
        }
    }
}
