//! Responder error types

use thiserror::Error;

/// Result type for responder operations
pub type ResponderResult<T> = Result<T, ResponderError>;

/// Errors that can occur while provisioning and verifying node records
#[derive(Debug, Error)]
pub enum ResponderError {
    /// No usable signing identity was supplied
    #[error("Require valid key for generating a cert: {0}")]
    IdentityMissing(String),

    /// The service computed a different node ID than the local identity
    #[error("Invalid key: service returned node ID '{returned}', expected '{expected}'")]
    AuthenticationMismatch { expected: String, returned: String },

    /// Network-level failure talking to the TLD service
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The service rejected the request as malformed or unauthorized
    #[error("Update rejected by TLD service (HTTP {status}): {message}")]
    RejectedRequest { status: u16, message: String },

    /// Any other non-success answer from the service
    #[error("TLD service error (HTTP {status}): {message}")]
    ServiceError { status: u16, message: String },

    /// The service answered 200 but the body was unusable
    #[error("Malformed TLD service response: {0}")]
    MalformedResponse(String),

    /// Operation is part of the plugin contract but not supported
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// DNS lookup failed
    #[error("DNS lookup failed for '{record}': {message}")]
    Resolution { record: String, message: String },

    /// Verification exceeded its configured ceiling
    #[error("DNS propagation timeout for record '{record}' after {polls} polls")]
    PropagationTimeout { record: String, polls: u64 },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The coordinator already failed and refuses further work
    #[error("Coordinator halted after earlier failure: {0}")]
    CoordinatorHalted(String),

    /// A challenge cycle is already running on this coordinator
    #[error("Challenge already in progress")]
    ChallengeInProgress,
}

impl ResponderError {
    /// Whether the request pool may retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::ServiceError { .. })
    }
}

impl From<reqwest::Error> for ResponderError {
    fn from(e: reqwest::Error) -> Self {
        ResponderError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ResponderError::AuthenticationMismatch {
            expected: "abc".to_string(),
            returned: "def".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("def"));

        let err = ResponderError::ServiceError {
            status: 503,
            message: "busy".to_string(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("busy"));

        let err = ResponderError::PropagationTimeout {
            record: "_acme-challenge.node.storj.farm".to_string(),
            polls: 900,
        };
        assert!(err.to_string().contains("900"));

        let err = ResponderError::NotImplemented("remove");
        assert!(err.to_string().contains("Not implemented"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ResponderError::Transport("reset".to_string()).is_retryable());
        assert!(ResponderError::ServiceError {
            status: 500,
            message: String::new()
        }
        .is_retryable());
        assert!(!ResponderError::RejectedRequest {
            status: 401,
            message: String::new()
        }
        .is_retryable());
        assert!(!ResponderError::AuthenticationMismatch {
            expected: "a".to_string(),
            returned: "b".to_string()
        }
        .is_retryable());
    }
}
