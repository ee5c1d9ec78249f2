//! DNS-01 challenge responder backed by signed record updates
//!
//! A node proves ownership of its records to a single TLD service by
//! signing each update with its identity key instead of holding registrar
//! credentials. The responder registers `<nodeID>.<domain>` as an A record,
//! publishes challenge digests at `_acme-challenge.<nodeID>.<domain>`, and
//! waits until both are stable in public DNS before a CA is asked to look.
//!
//! # Architecture
//!
//! - [`SignedUpdateClient`] - Signed A/TXT submission through a retrying pool
//! - [`PropagationVerifier`] - Polls DNS until a value is stable
//! - [`ChallengeCoordinator`] - Drives registration and challenge cycles
//! - [`resolve`] - Merges [`ResponderOptions`] over the defaults
//! - [`Dns01Challenge`] - Seam used by ACME clients
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sigdns_responder::{resolve, ChallengeCoordinator, Ed25519Identity, ResponderOptions};
//!
//! # async fn run() -> sigdns_responder::ResponderResult<()> {
//! let options = ResponderOptions::default()
//!     .with_identity(Arc::new(Ed25519Identity::generate()))
//!     .with_ip("203.0.113.7".parse().unwrap());
//!
//! let coordinator = ChallengeCoordinator::register(resolve(options)?).await?;
//! coordinator.set_challenge("token.thumbprint").await?;
//! # Ok(())
//! # }
//! ```

pub mod challenge;
pub mod error;
pub mod identity;
pub mod options;
pub mod plugin;
pub mod propagation;
pub mod record;
pub mod sleep;
pub mod update;

pub use challenge::{read_node_record, ChallengeCoordinator, CoordinatorState, NodeRecordState};
pub use error::{ResponderError, ResponderResult};
pub use identity::{derive_node_id, Ed25519Identity, Identity};
pub use options::{resolve, ResolvedConfig, ResponderOptions};
pub use plugin::{ChallengeRequestArgs, Dns01Challenge};
pub use propagation::{DnsLookup, HickoryLookup, PropagationSettings, PropagationVerifier};
pub use record::{
    challenge_record_fqdn, compute_challenge_digest, node_record_fqdn, ChallengeRequest,
    RecordType,
};
pub use sleep::{Sleeper, TokioSleeper};
pub use update::{
    exponential_interval, DefaultClassifier, ResponseClassifier, RetryPolicy, SignedUpdateClient,
    Verdict,
};
