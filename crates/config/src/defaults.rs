//! Default values for the responder configuration
//!
//! These mirror the behaviour a node gets when it supplies no overrides at
//! all: one submission at a time, ten attempts with exponential backoff, and
//! a sixty second stability window polled once per second.

/// Authoritative service accepting signed updates
pub const DEFAULT_TLD_SERVICE: &str = "https://dns.storj.farm";

/// Shared base domain for node records
pub const DEFAULT_DOMAIN: &str = "storj.farm";

pub const DEFAULT_BASE_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_POOL_SIZE: usize = 1;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_STABILITY_THRESHOLD: u32 = 60;

/// Sample configuration shipped with `sigdns check-config --print-sample`
pub const DEFAULT_CONFIG_KDL: &str = r#"
// sigdns sample configuration
// Copy this file and adjust the node section for your deployment.

responder {
    tld-service "https://dns.storj.farm"
    domain "storj.farm"
    ip "203.0.113.7"
    identity-file "/etc/sigdns/node.key"
}

retry {
    base-interval-ms 1000
    jitter-ms 0
    pool-size 1
    max-attempts 10
}

propagation {
    check-interval-secs 1
    stability-threshold 60
    // Upper bound on one verification; omit for no ceiling
    timeout-secs 900
}
"#;

pub(crate) fn default_tld_service() -> String {
    DEFAULT_TLD_SERVICE.to_string()
}

pub(crate) fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

pub(crate) fn default_base_interval_ms() -> u64 {
    DEFAULT_BASE_INTERVAL_MS
}

pub(crate) fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

pub(crate) fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

pub(crate) fn default_check_interval_secs() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

pub(crate) fn default_stability_threshold() -> u32 {
    DEFAULT_STABILITY_THRESHOLD
}
