//! HTTP request handlers.
//!
//! Handlers read the admitted identity with
//! [`CurrentIdentity`](crate::auth::current_identity::CurrentIdentity) and
//! never perform authentication themselves.
//!
//! - [`identities`]: current identity and identity lookup

pub mod identities;
