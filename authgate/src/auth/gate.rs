//! The authentication gate.
//!
//! [`Gate::authcheck`] produces a tower [`Layer`] bound to a fixed set of
//! required permissions. For every request the layer:
//!
//! 1. extracts the credential ([`extract_credential`]),
//! 2. verifies it with the [`TokenCodec`],
//! 3. resolves the subject with the [`IdentityResolver`],
//! 4. checks the required permissions,
//! 5. stores the identity as [`CurrentIdentity`] in request extensions and
//!    calls the inner service.
//!
//! The first failing step ends the request with the matching [`Error`]
//! response. The inner service never runs and nothing is stored.
//!
//! ```ignore
//! let gate = Gate::new(codec, resolver);
//! let app = Router::new()
//!     .route("/invoices", post(create_invoice))
//!     .route_layer(gate.authcheck(["billing.write"]));
//! ```

use axum::{
    extract::Request,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::{
    convert::Infallible,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tower::{Layer, Service};
use tracing::{debug, instrument, trace};

use super::{
    credential::extract_credential,
    current_identity::CurrentIdentity,
    identity::{Identity, Permission, SubjectId},
    permissions,
    resolver::IdentityResolver,
    token::TokenCodec,
};
use crate::errors::{Error, InvalidCredentialCause, Result};

/// Shared verification and lookup dependencies. Cheap to clone.
pub struct Gate<R> {
    codec: Arc<TokenCodec>,
    resolver: Arc<R>,
    resolver_timeout: Option<Duration>,
}

impl<R> Clone for Gate<R> {
    fn clone(&self) -> Self {
        Self {
            codec: self.codec.clone(),
            resolver: self.resolver.clone(),
            resolver_timeout: self.resolver_timeout,
        }
    }
}

impl<R: IdentityResolver> Gate<R> {
    pub fn new(codec: TokenCodec, resolver: R) -> Self {
        Self::from_shared(Arc::new(codec), Arc::new(resolver))
    }

    /// Build from dependencies the caller also holds on to
    pub fn from_shared(codec: Arc<TokenCodec>, resolver: Arc<R>) -> Self {
        Self {
            codec,
            resolver,
            resolver_timeout: None,
        }
    }

    /// Bound every identity lookup; an elapsed lookup counts as a failed one
    pub fn with_resolver_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.resolver_timeout = timeout;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Layer admitting only requests whose identity holds every permission in `required`
    pub fn authcheck<P, I>(&self, required: I) -> AuthcheckLayer<R>
    where
        P: Into<Permission>,
        I: IntoIterator<Item = P>,
    {
        AuthcheckLayer {
            check: Authcheck {
                gate: self.clone(),
                required: required.into_iter().map(Into::into).collect(),
            },
        }
    }

    async fn resolve(&self, subject: &SubjectId) -> Result<R::Identity> {
        let lookup = self.resolver.fetch_by_id(subject);

        let identity = match self.resolver_timeout {
            Some(timeout) => tokio::time::timeout(timeout, lookup).await.map_err(|_| Error::InvalidCredential {
                cause: InvalidCredentialCause::ResolutionTimeout(timeout),
            })?,
            None => lookup.await,
        }?;

        Ok(identity)
    }
}

/// A gate bound to one set of required permissions.
pub struct Authcheck<R> {
    gate: Gate<R>,
    required: Arc<[Permission]>,
}

impl<R> Clone for Authcheck<R> {
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
            required: self.required.clone(),
        }
    }
}

impl<R: IdentityResolver> Authcheck<R> {
    pub fn required(&self) -> &[Permission] {
        &self.required
    }

    /// Run extraction, verification, resolution and authorization for a request
    #[instrument(skip_all, fields(required = ?self.required))]
    pub async fn admit(&self, parts: &Parts) -> Result<R::Identity> {
        let credential = extract_credential(parts).ok_or_else(|| {
            trace!("No credential found in request");
            Error::MissingCredential
        })?;
        trace!("Found credential in {}", credential.source);

        let subject = self.gate.codec.verify(&credential.token)?;
        trace!("Credential verified for subject {}", subject);

        let identity = self.gate.resolve(&subject).await?;

        if let Some(missing) = permissions::first_missing(&identity, &self.required) {
            debug!("Identity {} lacks permission {}", identity.id(), missing);
            return Err(Error::InsufficientPermission {
                permission: missing.clone(),
            });
        }

        debug!("Admitted identity {}", identity.id());
        Ok(identity)
    }
}

/// Tower layer returned by [`Gate::authcheck`].
pub struct AuthcheckLayer<R> {
    check: Authcheck<R>,
}

impl<R> Clone for AuthcheckLayer<R> {
    fn clone(&self) -> Self {
        Self { check: self.check.clone() }
    }
}

impl<R> AuthcheckLayer<R> {
    pub fn authcheck(&self) -> &Authcheck<R> {
        &self.check
    }
}

impl<S, R> Layer<S> for AuthcheckLayer<R> {
    type Service = AuthcheckService<S, R>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthcheckService {
            inner,
            check: self.check.clone(),
        }
    }
}

/// Service wrapping a protected handler.
pub struct AuthcheckService<S, R> {
    inner: S,
    check: Authcheck<R>,
}

impl<S: Clone, R> Clone for AuthcheckService<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            check: self.check.clone(),
        }
    }
}

impl<S, R> Service<Request> for AuthcheckService<S, R>
where
    S: Service<Request, Error = Infallible> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send + 'static,
    R: IdentityResolver,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, std::result::Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // The clone is not ready; keep the ready service for this call
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let check = self.check.clone();

        Box::pin(async move {
            let (mut parts, body) = request.into_parts();
            match check.admit(&parts).await {
                Ok(identity) => {
                    parts.extensions.insert(CurrentIdentity(identity));
                    let response = inner.call(Request::from_parts(parts, body)).await?;
                    Ok(response.into_response())
                }
                Err(e) => Ok(e.into_response()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{
            identity::{AuthRecord, Permissions, UserId},
            resolver::{InMemoryResolver, ResolveError},
            token::TokenError,
        },
        test_utils::{CountingResolver, TEST_SECRET, create_test_gate, expired_token, test_record, valid_token},
    };
    use async_trait::async_trait;
    use axum::{Router, http::StatusCode, routing::get};
    use axum_test::TestServer;
    use serde_json::Value;

    fn parts_with_bearer(token: &str) -> Parts {
        let request = axum::http::Request::builder()
            .uri("http://localhost/test")
            .header("authorization", format!("Bearer {token}"))
            .body(())
            .unwrap();
        request.into_parts().0
    }

    #[tokio::test]
    async fn test_admit_returns_identity() {
        let gate = create_test_gate(InMemoryResolver::from_iter([test_record("user_abc", &["user.auth"])]));
        let token = gate.codec().issue("user_abc", Duration::from_secs(3600)).unwrap();

        let layer = gate.authcheck([Permission::USER_AUTH]);
        let identity = layer.authcheck().admit(&parts_with_bearer(&token)).await.unwrap();
        assert_eq!(identity.id(), "user_abc");
    }

    #[tokio::test]
    async fn test_missing_credential_skips_resolver() {
        let resolver = CountingResolver::new(vec![test_record("user_abc", &[])]);
        let gate = create_test_gate(resolver.clone());

        let request = axum::http::Request::builder().uri("http://localhost/test").body(()).unwrap();
        let (parts, _) = request.into_parts();

        let err = gate.authcheck(Vec::<Permission>::new()).authcheck().admit(&parts).await.unwrap_err();
        assert!(matches!(err, Error::MissingCredential));
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_bad_signature_skips_resolver() {
        let resolver = CountingResolver::new(vec![test_record("user_abc", &[])]);
        let gate = create_test_gate(resolver.clone());
        let forged = TokenCodec::new(b"not-the-secret").issue("user_abc", Duration::from_secs(60)).unwrap();

        let err = gate
            .authcheck(Vec::<Permission>::new())
            .authcheck()
            .admit(&parts_with_bearer(&forged))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCredential {
                cause: InvalidCredentialCause::Token(TokenError::SignatureInvalid)
            }
        ));
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_subject_is_invalid_credential() {
        let resolver = CountingResolver::new(vec![]);
        let gate = create_test_gate(resolver.clone());
        let token = gate.codec().issue("user_ghost", Duration::from_secs(60)).unwrap();

        let err = gate
            .authcheck(Vec::<Permission>::new())
            .authcheck()
            .admit(&parts_with_bearer(&token))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCredential {
                cause: InvalidCredentialCause::Resolution(ResolveError::NotFound { .. })
            }
        ));
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn test_repeated_query_token_admits_with_first_value() {
        let gate = create_test_gate(InMemoryResolver::from_iter([test_record("user_abc", &[])]));
        let uri = format!("http://localhost/test?token={}&token=junk", valid_token("user_abc"));
        let (parts, _) = axum::http::Request::builder().uri(uri).body(()).unwrap().into_parts();

        let identity = gate.authcheck(Vec::<Permission>::new()).authcheck().admit(&parts).await.unwrap();
        assert_eq!(identity.id(), "user_abc");
    }

    #[tokio::test]
    async fn test_first_missing_permission_is_reported() {
        let gate = create_test_gate(InMemoryResolver::from_iter([test_record("user_abc", &["a"])]));
        let token = gate.codec().issue("user_abc", Duration::from_secs(60)).unwrap();

        let err = gate
            .authcheck(["a", "b", "c"])
            .authcheck()
            .admit(&parts_with_bearer(&token))
            .await
            .unwrap_err();
        match err {
            Error::InsufficientPermission { permission } => assert_eq!(permission.as_str(), "b"),
            other => panic!("expected InsufficientPermission, got {other:?}"),
        }
    }

    /// Resolver that never answers
    struct Hanging;

    #[async_trait]
    impl IdentityResolver for Hanging {
        type Identity = AuthRecord;

        async fn fetch_by_id(&self, _subject: &SubjectId) -> std::result::Result<AuthRecord, ResolveError> {
            futures::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolver_timeout_denies() {
        let gate = Gate::new(TokenCodec::new(TEST_SECRET), Hanging).with_resolver_timeout(Some(Duration::from_secs(2)));
        let token = gate.codec().issue("user_abc", Duration::from_secs(3600)).unwrap();

        let err = gate
            .authcheck(Vec::<Permission>::new())
            .authcheck()
            .admit(&parts_with_bearer(&token))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCredential {
                cause: InvalidCredentialCause::ResolutionTimeout(_)
            }
        ));
        assert_eq!(err.user_message(), "Invalid token");
    }

    #[tokio::test]
    async fn test_same_gate_serves_distinct_requirements() {
        let mut permissions = Permissions::new();
        permissions.set("billing.read", true);
        let resolver = InMemoryResolver::from_iter([AuthRecord::new(UserId::parse("user_abc").unwrap(), permissions)]);
        let gate = create_test_gate(resolver);
        let token = gate.codec().issue("user_abc", Duration::from_secs(60)).unwrap();
        let parts = parts_with_bearer(&token);

        let read = gate.authcheck(["billing.read"]);
        let write = gate.authcheck(["billing.write"]);

        assert!(read.authcheck().admit(&parts).await.is_ok());
        assert!(write.authcheck().admit(&parts).await.is_err());
        assert_eq!(write.authcheck().required(), &[Permission::from("billing.write")]);
    }

    async fn whoami(CurrentIdentity(identity): CurrentIdentity<AuthRecord>) -> String {
        identity.user_id.to_string()
    }

    fn protected_server(resolver: CountingResolver, required: &[&'static str]) -> TestServer {
        let gate = create_test_gate(resolver);
        let router = Router::new()
            .route("/protected", get(whoami))
            .route_layer(gate.authcheck(required.iter().copied()));
        TestServer::new(router).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_bearer_header_admits_and_commits_identity() {
        let resolver = CountingResolver::new(vec![test_record("user_abc", &[])]);
        let server = protected_server(resolver.clone(), &[]);

        let response = server
            .get("/protected")
            .add_header("authorization", format!("Bearer {}", valid_token("user_abc")))
            .await;

        response.assert_status(StatusCode::OK);
        assert_eq!(response.text(), "user_abc");
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn test_each_credential_location_resolves_same_identity() {
        let resolver = CountingResolver::new(vec![test_record("user_abc", &["user.auth"])]);
        let server = protected_server(resolver.clone(), &["user.auth"]);
        let token = valid_token("user_abc");

        let by_header = server.get("/protected").add_header("authorization", format!("Bearer {token}")).await;
        let by_query = server.get("/protected").add_query_param("token", &token).await;
        let by_cookie = server.get("/protected").add_header("cookie", format!("X-JWT={token}")).await;

        for response in [by_header, by_query, by_cookie] {
            response.assert_status(StatusCode::OK);
            assert_eq!(response.text(), "user_abc");
        }
        assert_eq!(resolver.calls(), 3);
    }

    #[tokio::test]
    async fn test_no_credential_is_rejected_before_resolution() {
        let resolver = CountingResolver::new(vec![test_record("user_abc", &[])]);
        let server = protected_server(resolver.clone(), &[]);

        let response = server.get("/protected").await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["error"], "Missing or invalid token");
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_permission_is_forbidden() {
        let resolver = CountingResolver::new(vec![test_record("user_abc", &["user.auth"])]);
        let server = protected_server(resolver, &["billing.write"]);

        let response = server
            .get("/protected")
            .add_header("authorization", format!("Bearer {}", valid_token("user_abc")))
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
        let body: Value = response.json();
        assert_eq!(body["error"], "Missing permission: billing.write");
    }

    #[tokio::test]
    async fn test_permission_set_to_false_is_forbidden() {
        let mut permissions = Permissions::new();
        permissions.set("billing.write", false);
        let record = AuthRecord::new(UserId::parse("user_abc").unwrap(), permissions);
        let server = protected_server(CountingResolver::new(vec![record]), &["billing.write"]);

        let response = server
            .get("/protected")
            .add_header("authorization", format!("Bearer {}", valid_token("user_abc")))
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_expired_query_token_never_reaches_resolver() {
        let resolver = CountingResolver::new(vec![test_record("user_abc", &[])]);
        let server = protected_server(resolver.clone(), &[]);

        let response = server.get("/protected").add_query_param("token", expired_token("user_abc")).await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["error"], "Invalid token");
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_subject_looks_like_bad_signature() {
        let resolver = CountingResolver::new(vec![]);
        let server = protected_server(resolver.clone(), &[]);

        let unknown = server
            .get("/protected")
            .add_header("cookie", format!("X-JWT={}", valid_token("user_ghost")))
            .await;

        let forged_token = TokenCodec::new(b"not-the-secret").issue("user_ghost", Duration::from_secs(60)).unwrap();
        let forged = server.get("/protected").add_header("cookie", format!("X-JWT={forged_token}")).await;

        assert_eq!(resolver.calls(), 1);
        unknown.assert_status(StatusCode::UNAUTHORIZED);
        forged.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.json::<Value>(), forged.json::<Value>());
    }

    #[tokio::test]
    async fn test_handler_without_gate_is_unauthenticated() {
        let router = Router::new().route("/open", get(whoami));
        let server = TestServer::new(router).unwrap();

        let response = server.get("/open").await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["error"], "Unauthorized");
    }
}
