//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `AUTHGATE_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `AUTHGATE_` override YAML values
//! 3. **SECRET_KEY** - Special case: overrides `secret_key` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `AUTHGATE_AUTH__LEEWAY=30s` sets the `auth.leeway` field.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! AUTHGATE_PORT=8080
//!
//! # Set the signing secret (either form)
//! SECRET_KEY="change-me"
//! AUTHGATE_SECRET_KEY="change-me"
//!
//! # Override nested values
//! AUTHGATE_AUTH__ALGORITHM=HS384
//! AUTHGATE_AUTH__RESOLVER_TIMEOUT=2s
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::auth::{identity::AuthRecord, token};
use crate::errors::Error;

/// Largest clock skew tolerance accepted for expiry checks
const MAX_LEEWAY: Duration = Duration::from_secs(300);

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "AUTHGATE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Shared HMAC secret used to sign and verify credentials (required)
    pub secret_key: Option<String>,
    /// Credential verification settings
    pub auth: AuthConfig,
    /// Identity records loaded into the in-memory store at startup
    pub identities: Vec<AuthRecord>,
    /// Export traces over OTLP (endpoint configured via the standard OTEL_* env vars)
    pub enable_otel_export: bool,
    /// Log output format
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Signing algorithm. Credentials signed with anything else are rejected.
    pub algorithm: Algorithm,
    /// Clock skew tolerated when checking credential expiry
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,
    /// Upper bound on a single identity lookup; unset means unbounded
    #[serde(with = "humantime_serde")]
    pub resolver_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            secret_key: None,
            auth: AuthConfig::default(),
            identities: Vec::new(),
            enable_otel_export: false,
            log_format: LogFormat::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::HS256,
            leeway: Duration::ZERO,
            resolver_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.secret_key.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Internal {
                operation: "Config validation: secret_key is not configured. \
                     Please set SECRET_KEY or AUTHGATE_SECRET_KEY environment variable or add secret_key to config file."
                    .to_string(),
            });
        }

        if !token::is_hmac(self.auth.algorithm) {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: Unsupported signing algorithm {:?}. Only HS256, HS384 and HS512 are supported",
                    self.auth.algorithm
                ),
            });
        }

        if self.auth.leeway > MAX_LEEWAY {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: auth.leeway is too long ({:?}, maximum {:?})",
                    self.auth.leeway, MAX_LEEWAY
                ),
            });
        }

        if self.auth.resolver_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::Internal {
                operation: "Config validation: auth.resolver_timeout must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("AUTHGATE_").ignore(&["config"]).split("__"))
            // Plain SECRET_KEY is accepted too
            .merge(Env::raw().only(&["SECRET_KEY"]).map(|_| "secret_key".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
