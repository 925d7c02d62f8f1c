//! Authentication and authorization system.
//!
//! Requests are admitted by a [`gate::Gate`], which turns a bearer credential
//! into a resolved identity and checks it against a required permission set.
//!
//! # Pipeline
//!
//! 1. [`credential`]: find the credential (`Authorization: Bearer`, then
//!    `?token=`, then the `X-JWT` cookie)
//! 2. [`token`]: verify the JWT signature, algorithm and expiry
//! 3. [`resolver`]: look the subject up through an [`resolver::IdentityResolver`]
//! 4. [`permissions`]: require every listed permission, first miss wins
//! 5. [`current_identity`]: store the identity for downstream handlers
//!
//! Any failing step ends the request with an [`crate::errors::Error`]
//! response and the wrapped handler is not called.
//!
//! # Usage
//!
//! ```ignore
//! use authgate::auth::{current_identity::CurrentIdentity, gate::Gate, identity::AuthRecord};
//!
//! let gate = Gate::new(codec, resolver);
//! let app = Router::new()
//!     .route("/reports", get(reports))
//!     .route_layer(gate.authcheck(["reports.read"]));
//!
//! async fn reports(CurrentIdentity(user): CurrentIdentity<AuthRecord>) -> String {
//!     format!("Reports for {}", user.user_id)
//! }
//! ```

pub mod credential;
pub mod current_identity;
pub mod gate;
pub mod identity;
pub mod permissions;
pub mod resolver;
pub mod token;
