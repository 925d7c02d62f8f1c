//! Locating the bearer credential in a request.
//!
//! Locations are tried in a fixed order and the first non-empty value wins:
//!
//! 1. `Authorization: Bearer <token>` header
//! 2. `token` query parameter
//! 3. `X-JWT` cookie
//!
//! A location that is present but empty (e.g. `Authorization: Bearer ` or
//! `?token=`) counts as absent, and extraction moves on to the next one.

use axum::{
    extract::Query,
    http::{header, request::Parts},
};
use std::fmt;
use tracing::trace;

pub const BEARER_PREFIX: &str = "Bearer ";
pub const TOKEN_QUERY_PARAM: &str = "token";
pub const TOKEN_COOKIE_NAME: &str = "X-JWT";

/// Where a credential was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    AuthorizationHeader,
    QueryParameter,
    Cookie,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::AuthorizationHeader => write!(f, "authorization header"),
            CredentialSource::QueryParameter => write!(f, "query parameter"),
            CredentialSource::Cookie => write!(f, "cookie"),
        }
    }
}

/// Raw, unverified credential string and its location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub source: CredentialSource,
}

fn from_authorization_header(parts: &Parts) -> Option<String> {
    let auth_str = match parts.headers.get(header::AUTHORIZATION)?.to_str() {
        Ok(s) => s,
        Err(e) => {
            trace!("Ignoring non-UTF-8 authorization header: {}", e);
            return None;
        }
    };

    auth_str.strip_prefix(BEARER_PREFIX).map(str::to_string)
}

/// First `token` pair wins when the parameter repeats
fn from_query(parts: &Parts) -> Option<String> {
    match Query::<Vec<(String, String)>>::try_from_uri(&parts.uri) {
        Ok(Query(pairs)) => pairs.into_iter().find(|(name, _)| name == TOKEN_QUERY_PARAM).map(|(_, value)| value),
        Err(e) => {
            trace!("Ignoring unparseable query string: {}", e);
            None
        }
    }
}

fn from_cookie(parts: &Parts) -> Option<String> {
    for cookie_header in parts.headers.get_all(header::COOKIE) {
        let Ok(cookie_str) = cookie_header.to_str() else {
            continue;
        };

        for cookie in cookie_str.split(';') {
            let cookie = cookie.trim();
            if let Some((name, value)) = cookie.split_once('=')
                && name == TOKEN_COOKIE_NAME
                && !value.is_empty()
            {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Find the credential in priority order. `None` when every location is
/// missing or empty.
pub fn extract_credential(parts: &Parts) -> Option<Credential> {
    let non_empty = |token: Option<String>| token.filter(|t| !t.is_empty());

    if let Some(token) = non_empty(from_authorization_header(parts)) {
        return Some(Credential {
            token,
            source: CredentialSource::AuthorizationHeader,
        });
    }

    if let Some(token) = non_empty(from_query(parts)) {
        return Some(Credential {
            token,
            source: CredentialSource::QueryParameter,
        });
    }

    non_empty(from_cookie(parts)).map(|token| Credential {
        token,
        source: CredentialSource::Cookie,
    })
}
