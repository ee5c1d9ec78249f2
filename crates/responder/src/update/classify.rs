//! Per-attempt response classification
//!
//! The request pool hands every attempt's outcome to a
//! [`ResponseClassifier`], which decides whether the submission is finished,
//! should be retried, or must fail without further attempts.

use std::fmt::Debug;

use serde::Deserialize;

use crate::error::ResponderError;

/// Body returned by the TLD service, success or failure
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateResponseBody {
    /// Node ID the service computed from the submitted key
    #[serde(rename = "nodeID", default)]
    pub node_id: Option<String>,

    /// Error message on failure
    #[serde(default)]
    pub error: Option<String>,
}

/// One HTTP answer from the TLD service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResponse {
    pub status: u16,
    pub body: UpdateResponseBody,
}

impl ServiceResponse {
    /// Build a response from a status and raw body text
    ///
    /// Non-JSON bodies are kept as the error message so failures stay legible.
    pub fn from_text(status: u16, text: &str) -> Self {
        let body = serde_json::from_str::<UpdateResponseBody>(text).unwrap_or_else(|_| {
            let trimmed = text.trim();
            UpdateResponseBody {
                node_id: None,
                error: (!trimmed.is_empty()).then(|| trimmed.to_string()),
            }
        });
        Self { status, body }
    }

    /// Error message for reporting, falling back to the status code
    pub fn error_message(&self) -> String {
        self.body
            .error
            .clone()
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }
}

/// Outcome of a single attempt as seen by the classifier
pub type AttemptOutcome = Result<ServiceResponse, ResponderError>;

/// Classifier decision for one attempt
#[derive(Debug)]
pub enum Verdict {
    /// Stop retrying and hand the response to the caller
    Resolve(ServiceResponse),
    /// Schedule another attempt; surfaced if attempts run out
    Retry(ResponderError),
    /// Stop immediately with this error
    Fail(ResponderError),
}

/// Decides per attempt whether to retry, succeed, or fail fast
pub trait ResponseClassifier: Send + Sync + Debug {
    fn classify(&self, outcome: AttemptOutcome) -> Verdict;
}

/// Stock classification policy
///
/// - transport errors retry
/// - 400 and 401 resolve without retrying; the client reports them as
///   [`ResponderError::RejectedRequest`]
/// - any other non-200 retries with the service's error message
/// - 200 resolves
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultClassifier;

impl ResponseClassifier for DefaultClassifier {
    fn classify(&self, outcome: AttemptOutcome) -> Verdict {
        match outcome {
            Err(e) if e.is_retryable() => Verdict::Retry(e),
            Err(e) => Verdict::Fail(e),
            Ok(response) => match response.status {
                200 => Verdict::Resolve(response),
                // Don't retry on malformed requests
                400 | 401 => Verdict::Resolve(response),
                status => Verdict::Retry(ResponderError::ServiceError {
                    status,
                    message: response.error_message(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, text: &str) -> AttemptOutcome {
        Ok(ServiceResponse::from_text(status, text))
    }

    #[test]
    fn test_success_resolves() {
        let verdict = DefaultClassifier.classify(response(200, r#"{"nodeID":"abc"}"#));
        match verdict {
            Verdict::Resolve(r) => assert_eq!(r.body.node_id.as_deref(), Some("abc")),
            other => panic!("expected Resolve, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_and_unauthorized_resolve_without_retry() {
        for status in [400, 401] {
            let verdict = DefaultClassifier.classify(response(status, r#"{"error":"bad sig"}"#));
            assert!(matches!(verdict, Verdict::Resolve(ref r) if r.status == status));
        }
    }

    #[test]
    fn test_server_error_retries_with_message() {
        let verdict = DefaultClassifier.classify(response(503, r#"{"error":"try later"}"#));
        match verdict {
            Verdict::Retry(ResponderError::ServiceError { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "try later");
            }
            other => panic!("expected Retry, got {:?}", other),
        }
    }

    #[test]
    fn test_forbidden_is_retried() {
        assert!(matches!(
            DefaultClassifier.classify(response(403, "")),
            Verdict::Retry(ResponderError::ServiceError { status: 403, .. })
        ));
    }

    #[test]
    fn test_transport_error_retries() {
        let verdict =
            DefaultClassifier.classify(Err(ResponderError::Transport("connection reset".into())));
        assert!(matches!(verdict, Verdict::Retry(ResponderError::Transport(_))));
    }

    #[test]
    fn test_non_retryable_error_fails() {
        let verdict = DefaultClassifier.classify(Err(ResponderError::MalformedResponse(
            "truncated".into(),
        )));
        assert!(matches!(verdict, Verdict::Fail(_)));
    }

    #[test]
    fn test_plain_text_body_becomes_message() {
        let response = ServiceResponse::from_text(502, "Bad Gateway\n");
        assert_eq!(response.error_message(), "Bad Gateway");

        let response = ServiceResponse::from_text(500, "");
        assert_eq!(response.error_message(), "HTTP 500");
    }
}
