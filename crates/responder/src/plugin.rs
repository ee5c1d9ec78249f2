//! ACME client challenge plugin seam
//!
//! ACME clients drive DNS-01 responders through four operations keyed by
//! host-supplied arguments. [`ChallengeCoordinator`] implements them; the
//! arguments are accepted for compatibility and otherwise ignored, since a
//! coordinator only ever answers for its own node.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::challenge::ChallengeCoordinator;
use crate::error::ResponderResult;
use crate::options::ResolvedConfig;

/// Arguments an ACME client passes with every plugin call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengeRequestArgs {
    /// Host defaults, opaque to the responder
    #[serde(default)]
    pub defaults: serde_json::Value,
    /// Domain being validated
    #[serde(default)]
    pub domain: String,
    /// Challenge key (token)
    #[serde(default)]
    pub key: String,
}

/// DNS-01 challenge plugin contract
#[async_trait]
pub trait Dns01Challenge: Send + Sync {
    /// Publish `value` and resolve once it is observable
    async fn set(&self, request: &ChallengeRequestArgs, value: &str) -> ResponderResult<()>;

    /// Currently published challenge record, if any
    async fn get(&self, request: &ChallengeRequestArgs) -> ResponderResult<Option<String>>;

    /// Remove the challenge record
    async fn remove(&self, request: &ChallengeRequestArgs) -> ResponderResult<()>;

    /// Configuration the plugin runs with
    fn options(&self) -> &ResolvedConfig;

    /// Self-check lookup; same as [`Self::get`]
    async fn loopback(&self, request: &ChallengeRequestArgs) -> ResponderResult<Option<String>> {
        self.get(request).await
    }
}

#[async_trait]
impl Dns01Challenge for ChallengeCoordinator {
    async fn set(&self, _request: &ChallengeRequestArgs, value: &str) -> ResponderResult<()> {
        self.set_challenge(value).await
    }

    async fn get(&self, _request: &ChallengeRequestArgs) -> ResponderResult<Option<String>> {
        ChallengeCoordinator::get(self).await
    }

    async fn remove(&self, _request: &ChallengeRequestArgs) -> ResponderResult<()> {
        ChallengeCoordinator::remove(self).await
    }

    fn options(&self) -> &ResolvedConfig {
        self.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_deserialize_with_missing_fields() {
        let args: ChallengeRequestArgs =
            serde_json::from_str(r#"{"domain":"node.storj.farm"}"#).unwrap();
        assert_eq!(args.domain, "node.storj.farm");
        assert!(args.key.is_empty());
        assert!(args.defaults.is_null());
    }

    #[test]
    fn test_args_keep_opaque_defaults() {
        let args: ChallengeRequestArgs = serde_json::from_value(serde_json::json!({
            "defaults": {"challengeType": "dns-01", "debug": true},
            "domain": "node.storj.farm",
            "key": "token"
        }))
        .unwrap();
        assert_eq!(args.defaults["challengeType"], "dns-01");
        assert_eq!(args.key, "token");
    }
}
