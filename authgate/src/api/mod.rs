//! HTTP surface of the demonstration service.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Response data structures
//!
//! Every route except `/healthz` sits behind an authcheck layer; see
//! [`crate::build_router`] for the permissions each one requires.

pub mod handlers;
pub mod models;
