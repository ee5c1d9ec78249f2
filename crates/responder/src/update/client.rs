//! Signed record updates against the TLD service
//!
//! # Update API
//!
//! ```text
//! POST {tld_service}
//! Content-Type: application/json
//!
//! {
//!   "type": "A" | "TXT",
//!   "value": "203.0.113.7",
//!   "key": "<hex public key>",
//!   "signature": "<hex signature over value>"
//! }
//!
//! Response (200):
//! { "nodeID": "<node id computed from key>" }
//!
//! Response (error):
//! { "error": "message" }
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use super::classify::ServiceResponse;
use super::pool::{RequestPool, RetryPolicy};
use crate::error::{ResponderError, ResponderResult};
use crate::identity::Identity;
use crate::record::RecordType;
use crate::sleep::Sleeper;

/// Client submitting signed A/TXT updates through a [`RequestPool`]
#[derive(Debug)]
pub struct SignedUpdateClient {
    client: Client,
    endpoint: String,
    identity: Arc<dyn Identity>,
    pool: RequestPool,
}

impl SignedUpdateClient {
    /// Create a new update client
    ///
    /// # Arguments
    ///
    /// * `endpoint` - TLD service URL
    /// * `identity` - Signing identity proving record ownership
    /// * `policy` - Retry and concurrency policy
    /// * `sleeper` - Used for backoff between attempts
    /// * `timeout` - Per-request HTTP timeout
    pub fn new(
        endpoint: String,
        identity: Arc<dyn Identity>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        timeout: Duration,
    ) -> ResponderResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ResponderError::Configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            endpoint,
            identity,
            pool: RequestPool::new(policy, sleeper),
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        self.pool.policy()
    }

    /// Submit a signed update and return the node ID confirmed by the service
    ///
    /// Comparing the confirmed ID with the local one is left to the caller.
    pub async fn submit(&self, record_type: RecordType, value: &str) -> ResponderResult<String> {
        let request = UpdateRequest {
            record_type,
            value,
            key: hex::encode(self.identity.public_key()),
            signature: hex::encode(self.identity.sign(value.as_bytes())),
        };

        debug!(
            record_type = %record_type,
            value = %value,
            url = %self.endpoint,
            "Submitting signed record update"
        );

        let response = self.pool.execute(|| self.send(&request)).await?;

        if response.status != 200 {
            // Settled without retry by the classifier (400/401 by default)
            return Err(ResponderError::RejectedRequest {
                status: response.status,
                message: response.error_message(),
            });
        }

        if let Some(message) = response.body.error {
            return Err(ResponderError::ServiceError {
                status: response.status,
                message,
            });
        }

        let node_id = response.body.node_id.ok_or_else(|| {
            ResponderError::MalformedResponse("response is missing nodeID".to_string())
        })?;

        info!(record_type = %record_type, node_id = %node_id, "Record update accepted");
        Ok(node_id)
    }

    async fn send(&self, request: &UpdateRequest<'_>) -> ResponderResult<ServiceResponse> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResponderError::Transport(format!("request to {} timed out", self.endpoint))
                } else {
                    ResponderError::Transport(format!("update request failed: {}", e))
                }
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            ResponderError::Transport(format!(
                "failed to read update response (HTTP {}): {}",
                status, e
            ))
        })?;
        Ok(ServiceResponse::from_text(status, &text))
    }
}

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    #[serde(rename = "type")]
    record_type: RecordType,
    value: &'a str,
    key: String,
    signature: String,
}
