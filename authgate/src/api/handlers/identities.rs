//! HTTP handlers for identity endpoints.

use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    AppState,
    api::models::identities::IdentityResponse,
    auth::{current_identity::CurrentIdentity, identity::{AuthRecord, UserId}},
    errors::{Error, Result},
};

/// Identity admitted by the gate for this request
#[tracing::instrument(skip_all)]
pub async fn whoami(CurrentIdentity(identity): CurrentIdentity<AuthRecord>) -> Json<IdentityResponse> {
    Json(identity.into())
}

/// Look up a stored identity record
#[tracing::instrument(skip_all, fields(user_id = %user_id))]
pub async fn get_identity(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    _current: CurrentIdentity<AuthRecord>,
) -> Result<Json<IdentityResponse>> {
    let not_found = || Error::NotFound {
        resource: "Identity".to_string(),
        id: user_id.clone(),
    };

    let parsed = UserId::parse(&user_id).map_err(|_| not_found())?;
    let record = state.resolver.get(&parsed).ok_or_else(not_found)?;

    Ok(Json(record.into()))
}
