//! Configuration for the sigdns DNS-01 responder
//!
//! This crate provides the file-level configuration model: where the
//! authoritative TLD service lives, which domain and IP a node asserts, how
//! record updates are retried, and how DNS propagation is observed.
//!
//! # Module Organization
//!
//! - [`validation`]: Field and semantic validators
//! - `kdl`: KDL format parsing
//! - `defaults`: Default values and the sample configuration
//!
//! # Example
//!
//! ```kdl
//! responder {
//!     tld-service "https://dns.storj.farm"
//!     domain "storj.farm"
//!     ip "203.0.113.7"
//!     identity-file "/etc/sigdns/node.key"
//! }
//!
//! retry {
//!     base-interval-ms 1000
//!     jitter-ms 0
//!     pool-size 1
//!     max-attempts 10
//! }
//!
//! propagation {
//!     check-interval-secs 1
//!     stability-threshold 60
//!     timeout-secs 900
//!     nameservers "8.8.8.8" "1.1.1.1"
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

mod defaults;
mod kdl;
pub mod validation;

pub use defaults::{
    DEFAULT_BASE_INTERVAL_MS, DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_CONFIG_KDL, DEFAULT_DOMAIN,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_POOL_SIZE, DEFAULT_STABILITY_THRESHOLD, DEFAULT_TLD_SERVICE,
};

use defaults::*;

// ============================================================================
// Main Configuration Structure
// ============================================================================

/// Complete responder configuration as loaded from a file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ResponderConfig {
    /// Node, service and identity settings
    #[serde(default)]
    #[validate(nested)]
    pub node: NodeConfig,

    /// Update submission retry policy
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,

    /// Propagation polling policy
    #[serde(default)]
    #[validate(nested)]
    pub propagation: PropagationConfig,
}

/// Node and authoritative service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NodeConfig {
    /// Endpoint accepting signed record updates
    #[serde(default = "default_tld_service")]
    #[validate(custom(function = "crate::validation::validate_service_url"))]
    pub tld_service: String,

    /// Shared base domain under which node records live
    #[serde(default = "default_domain")]
    #[validate(length(min = 1, message = "domain must not be empty"))]
    pub domain: String,

    /// IP address asserted in the node's A record
    #[serde(default)]
    pub ip: Option<IpAddr>,

    /// File holding the node's hex-encoded signing seed
    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    /// Environment variable holding the node's hex-encoded signing seed
    #[serde(default)]
    pub identity_env: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            tld_service: default_tld_service(),
            domain: default_domain(),
            ip: None,
            identity_file: None,
            identity_env: None,
        }
    }
}

/// Retry policy for signed update submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RetryConfig {
    /// Base of the exponential backoff: attempt `n` waits `2^n * base`
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,

    /// Upper bound of random jitter added to each backoff
    #[serde(default)]
    pub jitter_ms: u64,

    /// Maximum submissions in flight at once
    #[serde(default = "default_pool_size")]
    #[validate(range(min = 1, message = "pool-size must be at least 1"))]
    pub pool_size: usize,

    /// Maximum attempts per submission
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, message = "max-attempts must be at least 1"))]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: default_base_interval_ms(),
            jitter_ms: 0,
            pool_size: default_pool_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryConfig {
    /// Backoff base as a duration
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    /// Jitter upper bound as a duration
    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }
}

/// Propagation polling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PropagationConfig {
    /// Seconds between polls
    #[serde(default = "default_check_interval_secs")]
    #[validate(range(min = 1, message = "check-interval-secs must be at least 1"))]
    pub check_interval_secs: u64,

    /// Consecutive matching polls required
    #[serde(default = "default_stability_threshold")]
    #[validate(range(min = 1, message = "stability-threshold must be at least 1"))]
    pub stability_threshold: u32,

    /// Optional ceiling on a single verification (unbounded when absent)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Nameservers to query (empty = system configuration)
    #[serde(default)]
    pub nameservers: Vec<IpAddr>,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            stability_threshold: default_stability_threshold(),
            timeout_secs: None,
            nameservers: Vec::new(),
        }
    }
}

impl PropagationConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

// ============================================================================
// Loading
// ============================================================================

impl ResponderConfig {
    /// Load configuration from a file
    ///
    /// The format is chosen by extension: `.json` is parsed as JSON,
    /// anything else as KDL.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("kdl");

        let config = match extension {
            "kdl" => Self::from_kdl(&content)?,
            "json" => Self::from_json(&content)?,
            _ => return Err(anyhow::anyhow!("Unsupported config format: {}", extension)),
        };

        tracing::debug!(path = %path.display(), "Loaded responder configuration");
        Ok(config)
    }

    /// Parse configuration from KDL format
    pub fn from_kdl(content: &str) -> Result<Self> {
        let doc: ::kdl::KdlDocument = content
            .parse()
            .map_err(|e: ::kdl::KdlError| anyhow::anyhow!("{}", kdl::render_parse_error(&e, content)))?;

        let config = kdl::parse_kdl_document(doc)?;
        config.validated()
    }

    /// Parse configuration from JSON format
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(content).context("Failed to parse JSON configuration")?;
        config.validated()
    }

    /// Run field and semantic validation, returning the config on success
    pub fn validated(self) -> Result<Self> {
        self.validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed:\n{}", e))?;
        validation::validate_config_semantics(&self)?;
        Ok(self)
    }
}
