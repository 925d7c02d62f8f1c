//! API response models.

pub mod identities;
