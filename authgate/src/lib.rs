//! # authgate: bearer-credential gate for axum services
//!
//! `authgate` decides, for every inbound request to a protected route, whether
//! the request may proceed. A route is protected by wrapping it in the layer
//! returned by [`Gate::authcheck`], which names the permissions the route
//! requires. Admitted requests carry their resolved identity in request
//! extensions, where handlers read it with [`CurrentIdentity`].
//!
//! ## Request Flow
//!
//! The gate locates a signed JWT in the `Authorization: Bearer` header, the
//! `token` query parameter or the `X-JWT` cookie (in that order), verifies it
//! with the shared secret, resolves its subject through an
//! [`IdentityResolver`](auth::resolver::IdentityResolver), and checks that
//! the identity holds every required permission. The first failure produces a
//! JSON error response (see [`errors::Error`]) and the handler never runs.
//!
//! ## Binary
//!
//! The `authgate` binary serves a small demonstration API backed by an
//! [`InMemoryResolver`] seeded from configuration:
//!
//! - `GET /healthz`: liveness, no authentication
//! - `GET /v1/me`: the admitted identity, no permissions required
//! - `GET /v1/identities/{user_id}`: a stored record, requires `identity.read`
//!
//! See [`config`] for configuration loading and [`telemetry`] for logging.

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod telemetry;
#[cfg(test)]
mod test_utils;

use axum::{Router, extract::Request, routing::get};
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, Span, debug, info};

pub use crate::auth::{current_identity::CurrentIdentity, gate::Gate};
use crate::auth::{identity::Permission, resolver::InMemoryResolver, token::TokenCodec};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .gate(gate)
///     .resolver(resolver)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub gate: Gate<InMemoryResolver>,
    /// Same store the gate resolves against
    pub resolver: Arc<InMemoryResolver>,
}

impl AppState {
    /// Build the codec, seed the identity store and wire both into a gate
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let codec = Arc::new(TokenCodec::from_config(&config)?);
        let resolver: Arc<InMemoryResolver> = Arc::new(config.identities.iter().cloned().collect());
        info!("Loaded {} identities into the in-memory store", resolver.len());

        let gate = Gate::from_shared(codec, resolver.clone()).with_resolver_timeout(config.auth.resolver_timeout);

        Ok(Self::builder().config(config).gate(gate).resolver(resolver).build())
    }
}

/// Span for one HTTP request. Records the path only: the query string can carry a credential.
fn request_span(request: &Request) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        version = ?request.version(),
    )
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let me_routes = Router::new()
        .route("/v1/me", get(api::handlers::identities::whoami))
        .route_layer(state.gate.authcheck(Vec::<Permission>::new()));

    let identity_routes = Router::new()
        .route("/v1/identities/{user_id}", get(api::handlers::identities::get_identity))
        .route_layer(state.gate.authcheck([Permission::IDENTITY_READ]));

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(me_routes)
        .merge(identity_routes)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting authgate on {}", config.bind_address());

        let state = AppState::from_config(config.clone())?;
        let router = build_router(state);

        Ok(Self { router, config })
    }

    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("authgate listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Server stopped");
        Ok(())
    }
}
