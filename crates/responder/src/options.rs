//! Responder options and their resolution
//!
//! Callers describe what they want to override in [`ResponderOptions`];
//! [`resolve`] merges that over the stock defaults and produces an immutable
//! [`ResolvedConfig`] shared by every component of a coordinator.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use sigdns_config::ResponderConfig;

use crate::error::{ResponderError, ResponderResult};
use crate::identity::Identity;
use crate::propagation::{PropagationSettings, DEFAULT_CHECK_INTERVAL, DEFAULT_STABILITY_THRESHOLD};
use crate::update::{exponential_interval, DefaultClassifier, IntervalFn, ResponseClassifier, RetryPolicy};

pub use sigdns_config::{DEFAULT_DOMAIN, DEFAULT_TLD_SERVICE};

/// Per-request HTTP timeout towards the TLD service
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_BASE_INTERVAL: Duration = Duration::from_millis(sigdns_config::DEFAULT_BASE_INTERVAL_MS);

/// Caller-supplied overrides; every field is optional
#[derive(Clone, Default)]
pub struct ResponderOptions {
    pub tld_service: Option<String>,
    pub domain: Option<String>,
    /// Address asserted in the node's A record
    pub ip: Option<IpAddr>,
    pub identity: Option<Arc<dyn Identity>>,
    pub interval: Option<IntervalFn>,
    pub jitter: Option<Duration>,
    pub pool_size: Option<usize>,
    pub max_attempts: Option<u32>,
    pub classifier: Option<Arc<dyn ResponseClassifier>>,
    pub request_timeout: Option<Duration>,
    pub check_interval: Option<Duration>,
    pub stability_threshold: Option<u32>,
    pub propagation_timeout: Option<Duration>,
    pub nameservers: Option<Vec<IpAddr>>,
}

impl fmt::Debug for ResponderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponderOptions")
            .field("tld_service", &self.tld_service)
            .field("domain", &self.domain)
            .field("ip", &self.ip)
            .field("identity", &self.identity)
            .field("jitter", &self.jitter)
            .field("pool_size", &self.pool_size)
            .field("max_attempts", &self.max_attempts)
            .field("check_interval", &self.check_interval)
            .field("stability_threshold", &self.stability_threshold)
            .field("propagation_timeout", &self.propagation_timeout)
            .finish_non_exhaustive()
    }
}

impl ResponderOptions {
    /// Options taken from a configuration file
    ///
    /// The identity is not part of the file model and must be added with
    /// [`Self::with_identity`].
    pub fn from_config(config: &ResponderConfig) -> Self {
        Self {
            tld_service: Some(config.node.tld_service.clone()),
            domain: Some(config.node.domain.clone()),
            ip: config.node.ip,
            identity: None,
            interval: Some(exponential_interval(config.retry.base_interval())),
            jitter: Some(config.retry.jitter()),
            pool_size: Some(config.retry.pool_size),
            max_attempts: Some(config.retry.max_attempts),
            classifier: None,
            request_timeout: None,
            check_interval: Some(config.propagation.check_interval()),
            stability_threshold: Some(config.propagation.stability_threshold),
            propagation_timeout: config.propagation.timeout(),
            nameservers: Some(config.propagation.nameservers.clone()),
        }
    }

    pub fn with_identity(mut self, identity: Arc<dyn Identity>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn with_tld_service(mut self, tld_service: impl Into<String>) -> Self {
        self.tld_service = Some(tld_service.into());
        self
    }
}

/// Fully merged, immutable configuration of one coordinator
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub tld_service: String,
    pub domain: String,
    pub ip: Ipv4Addr,
    pub identity: Arc<dyn Identity>,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub propagation: PropagationSettings,
    /// Recursive resolvers to poll; empty uses the system configuration
    pub nameservers: Vec<IpAddr>,
}

/// Merge `options` over the defaults
///
/// Fails with [`ResponderError::IdentityMissing`] when no usable identity is
/// present and with [`ResponderError::Configuration`] for any other unusable
/// value. Performs no I/O.
pub fn resolve(options: ResponderOptions) -> ResponderResult<ResolvedConfig> {
    let identity = options.identity.ok_or_else(|| {
        ResponderError::IdentityMissing("no identity was supplied".to_string())
    })?;
    if identity.node_id().is_empty() {
        return Err(ResponderError::IdentityMissing(
            "identity has an empty node ID".to_string(),
        ));
    }
    if identity.public_key().is_empty() {
        return Err(ResponderError::IdentityMissing(
            "identity has an empty public key".to_string(),
        ));
    }

    let ip = match options.ip {
        Some(IpAddr::V4(ip)) => ip,
        Some(IpAddr::V6(ip)) => {
            return Err(ResponderError::Configuration(format!(
                "A records need an IPv4 address, got '{}'",
                ip
            )))
        }
        None => {
            return Err(ResponderError::Configuration(
                "an IP address to assert is required".to_string(),
            ))
        }
    };

    let tld_service = options
        .tld_service
        .unwrap_or_else(|| DEFAULT_TLD_SERVICE.to_string());
    if !tld_service.starts_with("http://") && !tld_service.starts_with("https://") {
        return Err(ResponderError::Configuration(format!(
            "TLD service '{}' must be an http:// or https:// URL",
            tld_service
        )));
    }

    let domain = options.domain.unwrap_or_else(|| DEFAULT_DOMAIN.to_string());
    let domain = domain.trim_end_matches('.').to_string();
    if domain.is_empty() {
        return Err(ResponderError::Configuration(
            "domain must not be empty".to_string(),
        ));
    }

    let retry = RetryPolicy {
        interval: options
            .interval
            .unwrap_or_else(|| exponential_interval(DEFAULT_BASE_INTERVAL)),
        jitter: options.jitter.unwrap_or(Duration::ZERO),
        max_attempts: options.max_attempts.unwrap_or(sigdns_config::DEFAULT_MAX_ATTEMPTS),
        pool_size: options.pool_size.unwrap_or(sigdns_config::DEFAULT_POOL_SIZE),
        classifier: options
            .classifier
            .unwrap_or_else(|| Arc::new(DefaultClassifier)),
    };
    if retry.max_attempts == 0 {
        return Err(ResponderError::Configuration(
            "max attempts must be at least 1".to_string(),
        ));
    }
    if retry.pool_size == 0 {
        return Err(ResponderError::Configuration(
            "pool size must be at least 1".to_string(),
        ));
    }

    let propagation = PropagationSettings {
        check_interval: options.check_interval.unwrap_or(DEFAULT_CHECK_INTERVAL),
        stability_threshold: options
            .stability_threshold
            .unwrap_or(DEFAULT_STABILITY_THRESHOLD),
        timeout: options.propagation_timeout,
    };
    if propagation.stability_threshold == 0 {
        return Err(ResponderError::Configuration(
            "stability threshold must be at least 1".to_string(),
        ));
    }

    Ok(ResolvedConfig {
        tld_service,
        domain,
        ip,
        identity,
        retry,
        request_timeout: options.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        propagation,
        nameservers: options.nameservers.unwrap_or_default(),
    })
}
