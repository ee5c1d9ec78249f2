//! KDL configuration parsing.
//!
//! Converts a parsed KDL document into a [`ResponderConfig`]. Every block is
//! optional; missing fields fall back to the serde defaults.

mod helpers;

pub use helpers::{
    get_int_entry, get_string_args, get_string_entry, get_unsigned_entry, offset_to_line_col,
};

use anyhow::Result;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::defaults::*;
use crate::{NodeConfig, PropagationConfig, ResponderConfig, RetryConfig};

// ============================================================================
// Top-Level Document Parser
// ============================================================================

/// Convert a parsed KDL document to a ResponderConfig
pub fn parse_kdl_document(doc: kdl::KdlDocument) -> Result<ResponderConfig> {
    let mut config = ResponderConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "responder" => {
                config.node = parse_node_config(node)?;
            }
            "retry" => {
                config.retry = parse_retry_config(node)?;
            }
            "propagation" => {
                config.propagation = parse_propagation_config(node)?;
            }
            other => {
                return Err(anyhow::anyhow!(
                    "Unknown top-level configuration block: '{}'\n\
                     Valid blocks are: responder, retry, propagation",
                    other
                ));
            }
        }
    }

    Ok(config)
}

fn parse_ip(value: &str, field: &str) -> Result<IpAddr> {
    value.parse::<IpAddr>().map_err(|_| {
        anyhow::anyhow!(
            "Invalid IP address '{}' for '{}', e.g., {} \"203.0.113.7\"",
            value,
            field,
            field
        )
    })
}

/// Parse the `responder` block
fn parse_node_config(node: &kdl::KdlNode) -> Result<NodeConfig> {
    let ip = get_string_entry(node, "ip")
        .map(|s| parse_ip(&s, "ip"))
        .transpose()?;

    Ok(NodeConfig {
        tld_service: get_string_entry(node, "tld-service").unwrap_or_else(default_tld_service),
        domain: get_string_entry(node, "domain").unwrap_or_else(default_domain),
        ip,
        identity_file: get_string_entry(node, "identity-file").map(PathBuf::from),
        identity_env: get_string_entry(node, "identity-env"),
    })
}

/// Parse the `retry` block
fn parse_retry_config(node: &kdl::KdlNode) -> Result<RetryConfig> {
    Ok(RetryConfig {
        base_interval_ms: get_unsigned_entry(node, "base-interval-ms")?
            .unwrap_or_else(default_base_interval_ms),
        jitter_ms: get_unsigned_entry(node, "jitter-ms")?.unwrap_or(0),
        pool_size: get_unsigned_entry(node, "pool-size")?
            .map(|v| v as usize)
            .unwrap_or_else(default_pool_size),
        max_attempts: get_unsigned_entry(node, "max-attempts")?
            .map(|v| v.min(u32::MAX as u64) as u32)
            .unwrap_or_else(default_max_attempts),
    })
}

/// Parse the `propagation` block
fn parse_propagation_config(node: &kdl::KdlNode) -> Result<PropagationConfig> {
    let nameservers = get_string_args(node, "nameservers")
        .iter()
        .map(|s| parse_ip(s, "nameservers"))
        .collect::<Result<Vec<_>>>()?;

    Ok(PropagationConfig {
        check_interval_secs: get_unsigned_entry(node, "check-interval-secs")?
            .unwrap_or_else(default_check_interval_secs),
        stability_threshold: get_unsigned_entry(node, "stability-threshold")?
            .map(|v| v.min(u32::MAX as u64) as u32)
            .unwrap_or_else(default_stability_threshold),
        timeout_secs: get_unsigned_entry(node, "timeout-secs")?,
        nameservers,
    })
}

// ============================================================================
// Error Rendering
// ============================================================================

/// Render a KDL parse error with line/column context
pub fn render_parse_error(e: &kdl::KdlError, content: &str) -> String {
    use miette::Diagnostic;

    let mut error_msg = String::new();
    error_msg.push_str("KDL configuration parse error:\n\n");

    let mut found_details = false;
    if let Some(related) = e.related() {
        for diagnostic in related {
            error_msg.push_str(&format!("  {}\n", diagnostic));
            found_details = true;

            if let Some(labels) = diagnostic.labels() {
                for label in labels {
                    let (line, col) = offset_to_line_col(content, label.offset());
                    error_msg.push_str(&format!("\n  --> at line {}, column {}\n", line, col));

                    if let Some(line_content) = content.lines().nth(line.saturating_sub(1)) {
                        error_msg.push_str(&format!("{:>4} | {}\n", line, line_content));
                        error_msg.push_str(&format!("     | {}^", " ".repeat(col.saturating_sub(1))));
                        if let Some(label_msg) = label.label() {
                            error_msg.push_str(&format!(" {}", label_msg));
                        }
                        error_msg.push('\n');
                    }
                }
            }

            if let Some(help) = diagnostic.help() {
                error_msg.push_str(&format!("\n  Help: {}\n", help));
            }
        }
    }

    if !found_details {
        error_msg.push_str(&format!("  {}\n", e));
    }

    error_msg
}
