//! Shared fixtures for unit and HTTP tests.

use async_trait::async_trait;
use axum_test::TestServer;
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use crate::auth::{
    gate::Gate,
    identity::{AuthRecord, Permission, Permissions, SubjectId, UserId, UserType},
    resolver::{IdentityResolver, InMemoryResolver, ResolveError},
    token::{TokenClaims, TokenCodec},
};
use crate::config::Config;

pub const TEST_SECRET: &[u8] = b"test-secret-key-for-authgate";

pub fn create_test_app() -> TestServer {
    crate::Application::new(create_test_config())
        .expect("Failed to create application")
        .into_test_server()
}

/// Two seeded identities: `user_alice` is an admin holding `user.auth` and
/// `identity.read`, `user_bob` holds `user.auth` only.
pub fn create_test_config() -> Config {
    let mut alice = test_record("user_alice", &["user.auth", "identity.read"]);
    alice.user_type = UserType::Admin;

    let mut config = Config {
        secret_key: Some(String::from_utf8_lossy(TEST_SECRET).into_owned()),
        identities: vec![alice, test_record("user_bob", &["user.auth"])],
        ..Default::default()
    };
    config.auth.resolver_timeout = Some(Duration::from_secs(1));
    config
}

pub fn test_record(user_id: &str, permissions: &[&'static str]) -> AuthRecord {
    AuthRecord::new(
        UserId::parse(user_id).expect("test user ids carry the user_ prefix"),
        permissions.iter().map(|p| Permission::from(*p)).collect::<Permissions>(),
    )
}

pub fn create_test_gate<R: IdentityResolver>(resolver: R) -> Gate<R> {
    Gate::new(TokenCodec::new(TEST_SECRET), resolver)
}

/// Credential for `subject` signed with [`TEST_SECRET`], valid for an hour
pub fn valid_token(subject: &str) -> String {
    TokenCodec::new(TEST_SECRET)
        .issue(subject, Duration::from_secs(3600))
        .expect("Failed to sign test token")
}

/// Correctly signed credential that expired an hour ago
pub fn expired_token(subject: &str) -> String {
    let now = Utc::now();
    let claims = TokenClaims {
        sub: subject.to_string(),
        iat: (now - chrono::Duration::hours(2)).timestamp(),
        exp: (now - chrono::Duration::hours(1)).timestamp(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_SECRET)).expect("Failed to sign test token")
}

/// In-memory resolver that counts lookups.
#[derive(Clone)]
pub struct CountingResolver {
    inner: Arc<InMemoryResolver>,
    calls: Arc<AtomicUsize>,
}

impl CountingResolver {
    pub fn new(records: Vec<AuthRecord>) -> Self {
        Self {
            inner: Arc::new(records.into_iter().collect()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityResolver for CountingResolver {
    type Identity = AuthRecord;

    async fn fetch_by_id(&self, subject: &SubjectId) -> Result<AuthRecord, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_by_id(subject).await
    }
}
