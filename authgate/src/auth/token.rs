//! JWT credential issuance and verification.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use thiserror::Error;

use super::identity::SubjectId;
use crate::{config::Config, errors::Error};

/// Why a credential failed verification
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed credential")]
    Malformed,
    #[error("credential signature is invalid")]
    SignatureInvalid,
    #[error("credential has expired")]
    Expired,
    #[error("credential uses an unsupported signing algorithm")]
    UnsupportedAlgorithm,
}

/// Whether `algorithm` is keyed by a shared secret
pub fn is_hmac(algorithm: Algorithm) -> bool {
    matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// JWT claims carried by a credential
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID). Older credentials carry it as `ID`.
    #[serde(alias = "ID")]
    pub sub: String,
    /// Issued at
    #[serde(default)]
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
}

/// Signs and verifies credentials with a shared HMAC secret.
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// HS256 codec with no expiry leeway
    pub fn new(secret: &[u8]) -> Self {
        Self::with_algorithm(secret, Algorithm::HS256)
    }

    pub fn with_algorithm(secret: &[u8], algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;

        Self {
            algorithm,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Tolerate clocks up to `leeway` apart when checking expiry
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.validation.leeway = leeway.as_secs();
        self
    }

    /// Build the codec from validated configuration
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let secret_key = config.secret_key.as_deref().filter(|s| !s.is_empty()).ok_or_else(|| Error::Internal {
            operation: "build token codec: secret_key is required".to_string(),
        })?;

        let algorithm = config.auth.algorithm;
        if !is_hmac(algorithm) {
            return Err(Error::Internal {
                operation: format!("build token codec: {algorithm:?} is not an HMAC algorithm"),
            });
        }

        Ok(Self::with_algorithm(secret_key.as_bytes(), algorithm).with_leeway(config.auth.leeway))
    }

    /// Sign a credential for `subject` valid for `ttl` from now
    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<String, Error> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| Error::Internal {
            operation: format!("create JWT: invalid ttl: {e}"),
        })?;

        let claims = TokenClaims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding).map_err(|e| Error::Internal {
            operation: format!("create JWT: {e}"),
        })
    }

    /// Verify a credential and return its subject
    pub fn verify(&self, token: &str) -> Result<SubjectId, TokenError> {
        let token_data = decode::<TokenClaims>(token, &self.decoding, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => TokenError::SignatureInvalid,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName | ErrorKind::MissingAlgorithm => TokenError::UnsupportedAlgorithm,
            // Everything else (bad base64, bad JSON, missing claims, key problems) is a deny
            _ => TokenError::Malformed,
        })?;

        if token_data.claims.sub.is_empty() {
            return Err(TokenError::Malformed);
        }

        Ok(SubjectId::from(token_data.claims.sub))
    }
}
