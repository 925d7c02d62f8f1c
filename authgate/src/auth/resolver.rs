//! Identity resolution.
//!
//! The gate depends on [`IdentityResolver`] only. Real deployments back it
//! with whatever store holds their identity records; [`InMemoryResolver`] is
//! the store used by the bundled binary and by tests.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{instrument, trace};

use super::identity::{AuthRecord, Identity, SubjectId, UserId};

#[derive(Debug, Error)]
pub enum ResolveError {
    /// No identity exists for the subject
    #[error("no identity for subject {subject}")]
    NotFound { subject: SubjectId },

    /// The backing store failed
    #[error("identity backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Maps a verified subject identifier to a full identity record.
///
/// Implementations own any retry policy; the gate calls once and treats every
/// error as an authentication failure.
#[async_trait]
pub trait IdentityResolver: Send + Sync + 'static {
    type Identity: Identity;

    async fn fetch_by_id(&self, subject: &SubjectId) -> Result<Self::Identity, ResolveError>;
}

#[async_trait]
impl<R: IdentityResolver> IdentityResolver for Arc<R> {
    type Identity = R::Identity;

    async fn fetch_by_id(&self, subject: &SubjectId) -> Result<Self::Identity, ResolveError> {
        (**self).fetch_by_id(subject).await
    }
}

/// Concurrent in-memory store of [`AuthRecord`]s keyed by user ID.
#[derive(Debug, Default)]
pub struct InMemoryResolver {
    records: DashMap<UserId, AuthRecord>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record, replacing any existing record for the same user
    pub fn insert(&self, record: AuthRecord) -> Option<AuthRecord> {
        self.records.insert(record.user_id.clone(), record)
    }

    pub fn remove(&self, user_id: &UserId) -> Option<AuthRecord> {
        self.records.remove(user_id).map(|(_, record)| record)
    }

    pub fn get(&self, user_id: &UserId) -> Option<AuthRecord> {
        self.records.get(user_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<AuthRecord> for InMemoryResolver {
    fn from_iter<T: IntoIterator<Item = AuthRecord>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().map(|record| (record.user_id.clone(), record)).collect(),
        }
    }
}

#[async_trait]
impl IdentityResolver for InMemoryResolver {
    type Identity = AuthRecord;

    #[instrument(skip_all, fields(subject = %subject))]
    async fn fetch_by_id(&self, subject: &SubjectId) -> Result<AuthRecord, ResolveError> {
        let not_found = || ResolveError::NotFound { subject: subject.clone() };

        let user_id = UserId::parse(subject.as_str()).map_err(|e| {
            trace!("Subject is not a user ID: {}", e);
            not_found()
        })?;

        self.get(&user_id).ok_or_else(not_found)
    }
}
