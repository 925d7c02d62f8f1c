//! Identity and permission types.
//!
//! The gate is generic over any type implementing [`Identity`]. The default
//! deployment uses [`AuthRecord`], which pairs a [`UserId`] with a
//! [`Permissions`] map.
//!
//! # Permissions
//!
//! A [`Permission`] is a plain capability name such as `"billing.write"`.
//! There is no hierarchy: `"billing"` does not imply `"billing.write"`.
//! [`Permissions`] maps names to booleans, and a name mapped to `false` is
//! treated exactly like an absent name.

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, collections::BTreeMap, fmt};
use thiserror::Error;
use uuid::Uuid;

/// Capability contract the gate needs from a resolved principal.
pub trait Identity: Clone + Send + Sync + 'static {
    /// Unique identifier of the principal
    fn id(&self) -> &str;

    /// Whether the principal holds `permission`
    fn has_permission(&self, permission: &Permission) -> bool;
}

/// Subject identifier taken from a verified credential. Not yet known to
/// belong to a real identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SubjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for SubjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named capability.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    /// Baseline permission held by any user allowed to authenticate at all
    pub const USER_AUTH: Permission = Permission::from_static("user.auth");
    /// Read access to other identities' records
    pub const IDENTITY_READ: Permission = Permission::from_static("identity.read");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Permission {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for Permission {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Permission map of an identity.
///
/// Accepts either a map (`{"user.auth": true}`) or a list of held names
/// (`["user.auth"]`) when deserializing; always serializes as a map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PermissionsRepr")]
pub struct Permissions(BTreeMap<Permission, bool>);

#[derive(Deserialize)]
#[serde(untagged)]
enum PermissionsRepr {
    Map(BTreeMap<Permission, bool>),
    List(Vec<Permission>),
}

impl From<PermissionsRepr> for Permissions {
    fn from(repr: PermissionsRepr) -> Self {
        match repr {
            PermissionsRepr::Map(map) => Self(map),
            PermissionsRepr::List(list) => list.into_iter().collect(),
        }
    }
}

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// True only for an entry explicitly set to `true`
    pub fn grants(&self, permission: &Permission) -> bool {
        self.0.get(permission).copied().unwrap_or(false)
    }

    pub fn set(&mut self, permission: impl Into<Permission>, held: bool) {
        self.0.insert(permission.into(), held);
    }

    /// Names of held permissions, in sorted order
    pub fn held(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter().filter(|(_, held)| **held).map(|(permission, _)| permission)
    }
}

impl FromIterator<(Permission, bool)> for Permissions {
    fn from_iter<T: IntoIterator<Item = (Permission, bool)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromIterator<Permission> for Permissions {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        iter.into_iter().map(|permission| (permission, true)).collect()
    }
}

const USER_ID_PREFIX: &str = "user_";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid user ID: {0}")]
pub struct InvalidUserId(pub String);

/// User identifier of the form `user_<32 hex chars>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Generate a fresh random user ID
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(format!("{USER_ID_PREFIX}{}", Uuid::new_v4().simple()))
    }

    /// Validate an untrusted string as a user ID. Only the prefix is checked.
    pub fn parse(value: &str) -> Result<Self, InvalidUserId> {
        if value.starts_with(USER_ID_PREFIX) {
            Ok(Self(value.to_string()))
        } else {
            Err(InvalidUserId(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = InvalidUserId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.starts_with(USER_ID_PREFIX) {
            Ok(Self(value))
        } else {
            Err(InvalidUserId(value))
        }
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Admin,
    #[default]
    User,
}

/// Identity record of the default deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    pub user_id: UserId,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub user_type: UserType,
}

impl AuthRecord {
    pub fn new(user_id: UserId, permissions: Permissions) -> Self {
        Self {
            user_id,
            permissions,
            user_type: UserType::default(),
        }
    }
}

impl Identity for AuthRecord {
    fn id(&self) -> &str {
        self.user_id.as_str()
    }

    fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.grants(permission)
    }
}
