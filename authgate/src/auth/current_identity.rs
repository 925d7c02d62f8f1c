//! Reading the identity committed by the gate.
//!
//! The gate stores the resolved identity in request extensions as a
//! [`CurrentIdentity<I>`]. Extensions are keyed by type, so a lookup for a
//! different identity type simply finds nothing and fails with
//! [`Error::Unauthenticated`].

use axum::{
    extract::FromRequestParts,
    http::{Extensions, request::Parts},
};
use tracing::trace;

use super::identity::Identity;
use crate::errors::{Error, Result};

/// Identity of the principal admitted by the gate.
///
/// ```ignore
/// async fn handler(CurrentIdentity(user): CurrentIdentity<AuthRecord>) -> String {
///     format!("Hello, {}!", user.user_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentIdentity<I>(pub I);

/// Borrow the identity the gate stored in `extensions`
pub fn current_identity<I: Identity>(extensions: &Extensions) -> Result<&I> {
    extensions.get::<CurrentIdentity<I>>().map(|current| &current.0).ok_or_else(|| {
        trace!("No identity of type {} in request extensions", std::any::type_name::<I>());
        Error::Unauthenticated
    })
}

impl<S, I> FromRequestParts<S> for CurrentIdentity<I>
where
    S: Send + Sync,
    I: Identity,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        current_identity::<I>(&parts.extensions).cloned().map(CurrentIdentity)
    }
}
