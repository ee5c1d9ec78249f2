//! Signed record submission to the TLD service
//!
//! - [`SignedUpdateClient`] - Signs and submits A/TXT updates
//! - [`RequestPool`] - Bounded concurrency with retry and backoff
//! - [`ResponseClassifier`] - Per-attempt retry/succeed/fail decisions

mod classify;
mod client;
mod pool;

pub use classify::{
    AttemptOutcome, DefaultClassifier, ResponseClassifier, ServiceResponse, UpdateResponseBody,
    Verdict,
};
pub use client::SignedUpdateClient;
pub use pool::{exponential_interval, IntervalFn, RequestPool, RetryPolicy};
