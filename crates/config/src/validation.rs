//! Configuration validation functions
//!
//! Field validators are wired in through `validator` derives; the semantic
//! pass checks relationships between blocks that a single field cannot see.

use tracing::{trace, warn};

use crate::ResponderConfig;

// ============================================================================
// Field Validators
// ============================================================================

/// Validate that the TLD service is an absolute http(s) URL
pub fn validate_service_url(url: &str) -> Result<(), validator::ValidationError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));

    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
        _ => {
            let mut err = validator::ValidationError::new("invalid_service_url");
            err.message = Some(std::borrow::Cow::Owned(format!(
                "Invalid tld-service '{}'. Expected an absolute URL (e.g., 'https://dns.example.com')",
                url
            )));
            Err(err)
        }
    }
}

// ============================================================================
// Semantic Validation
// ============================================================================

/// Cross-field checks run after field validation
pub fn validate_config_semantics(config: &ResponderConfig) -> anyhow::Result<()> {
    trace!(
        domain = %config.node.domain,
        nameservers = config.propagation.nameservers.len(),
        "Starting semantic validation"
    );

    if config.node.domain.starts_with('.') || config.node.domain.ends_with('.') {
        return Err(anyhow::anyhow!(
            "domain '{}' must not start or end with a dot",
            config.node.domain
        ));
    }

    if config.node.identity_file.is_some() && config.node.identity_env.is_some() {
        return Err(anyhow::anyhow!(
            "Specify either 'identity-file' or 'identity-env', not both"
        ));
    }

    if let Some(timeout) = config.propagation.timeout_secs {
        let window = config
            .propagation
            .check_interval_secs
            .checked_mul(u64::from(config.propagation.stability_threshold))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "propagation check-interval-secs {} times stability-threshold {} is too large",
                    config.propagation.check_interval_secs,
                    config.propagation.stability_threshold
                )
            })?;
        if timeout < window {
            return Err(anyhow::anyhow!(
                "propagation timeout-secs {} is shorter than the stability window ({}s); \
                 verification could never succeed",
                timeout,
                window
            ));
        }
    }

    if config.retry.jitter_ms > 0 && config.retry.base_interval_ms == 0 {
        warn!("retry jitter is set but base-interval-ms is 0; retries are spaced by jitter only");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_service_url() {
        assert!(validate_service_url("https://dns.storj.farm").is_ok());
        assert!(validate_service_url("http://127.0.0.1:3000/update").is_ok());
        assert!(validate_service_url("dns.storj.farm").is_err());
        assert!(validate_service_url("https://").is_err());
        assert!(validate_service_url("ftp://dns.example.com").is_err());
    }

    #[test]
    fn test_timeout_shorter_than_window() {
        let mut config = ResponderConfig::default();
        config.propagation.timeout_secs = Some(30);
        let err = validate_config_semantics(&config).unwrap_err();
        assert!(err.to_string().contains("stability window"));

        config.propagation.timeout_secs = Some(60);
        assert!(validate_config_semantics(&config).is_ok());
    }

    #[test]
    fn test_oversized_window_rejected() {
        let mut config = ResponderConfig::default();
        config.propagation.check_interval_secs = u64::MAX;
        config.propagation.stability_threshold = 2;
        config.propagation.timeout_secs = Some(900);
        let err = validate_config_semantics(&config).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_identity_sources_exclusive() {
        let mut config = ResponderConfig::default();
        config.node.identity_file = Some("/tmp/key".into());
        config.node.identity_env = Some("KEY".to_string());
        assert!(validate_config_semantics(&config).is_err());
    }

    #[test]
    fn test_domain_dots() {
        let mut config = ResponderConfig::default();
        config.node.domain = "storj.farm.".to_string();
        assert!(validate_config_semantics(&config).is_err());
    }
}
