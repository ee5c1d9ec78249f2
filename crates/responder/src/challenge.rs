//! DNS-01 challenge coordination
//!
//! Drives one node through its record lifecycle:
//! 1. Register the node's A record (on construction)
//! 2. Publish the challenge digest as a TXT record
//! 3. Wait for TXT, then A, to be stable in public DNS
//!
//! ```text
//! Constructing -> Registered -> ChallengeSubmitted -> Verifying -> Ready
//!                      ^                                            |
//!                      +------------- next challenge ---------------+
//! ```
//!
//! Any error on an edge moves the coordinator to `Failed`, after which it
//! refuses further challenges.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::{ResponderError, ResponderResult};
use crate::options::ResolvedConfig;
use crate::propagation::{DnsLookup, HickoryLookup, PropagationVerifier};
use crate::record::{node_record_fqdn, ChallengeRequest, RecordType};
use crate::sleep::{Sleeper, TokioSleeper};
use crate::update::SignedUpdateClient;

/// Lifecycle state of a [`ChallengeCoordinator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// A record submission in flight; never observable on a built coordinator
    Constructing,
    Registered,
    ChallengeSubmitted,
    Verifying,
    Ready,
    Failed,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoordinatorState::Constructing => "constructing",
            CoordinatorState::Registered => "registered",
            CoordinatorState::ChallengeSubmitted => "challenge-submitted",
            CoordinatorState::Verifying => "verifying",
            CoordinatorState::Ready => "ready",
            CoordinatorState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the coordinator knows about its node's records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecordState {
    /// Derived locally from the identity
    pub node_id: String,
    /// Returned by the TLD service on registration
    pub confirmed_node_id: String,
    pub ip: Ipv4Addr,
}

#[derive(Debug)]
struct StateCell {
    state: CoordinatorState,
    /// Message of the first fatal error
    failure: Option<String>,
}

/// Coordinates signed updates and propagation checks for one node
#[derive(Debug)]
pub struct ChallengeCoordinator {
    config: ResolvedConfig,
    client: SignedUpdateClient,
    verifier: PropagationVerifier,
    record: NodeRecordState,
    state: Mutex<StateCell>,
}

impl ChallengeCoordinator {
    /// Register the node's A record and return a coordinator in `Registered`
    ///
    /// Resolves public DNS through hickory and waits on the tokio timer.
    pub async fn register(config: ResolvedConfig) -> ResponderResult<Self> {
        let lookup = Arc::new(HickoryLookup::new(&config.nameservers)?);
        Self::register_with(config, lookup, Arc::new(TokioSleeper)).await
    }

    /// Register using the given DNS lookup and sleeper
    ///
    /// No coordinator is produced unless the service confirmed the local
    /// node ID, so a challenge can never be set before registration settled.
    pub async fn register_with(
        config: ResolvedConfig,
        lookup: Arc<dyn DnsLookup>,
        sleeper: Arc<dyn Sleeper>,
    ) -> ResponderResult<Self> {
        let node_id = config.identity.node_id();
        let ip = config.ip;

        debug!(
            node_id = %node_id,
            ip = %ip,
            state = %CoordinatorState::Constructing,
            "Registering node A record"
        );

        let client = SignedUpdateClient::new(
            config.tld_service.clone(),
            config.identity.clone(),
            config.retry.clone(),
            sleeper.clone(),
            config.request_timeout,
        )?;

        let confirmed_node_id = match client.submit(RecordType::A, &ip.to_string()).await {
            Ok(returned) => confirm_node_id(&node_id, returned)?,
            Err(e) => {
                error!(node_id = %node_id, error = %e, "Node registration failed");
                return Err(e);
            }
        };

        let verifier = PropagationVerifier::new(config.propagation.clone(), lookup, sleeper);

        info!(
            node_id = %confirmed_node_id,
            record = %node_record_fqdn(&confirmed_node_id, &config.domain),
            ip = %ip,
            "Node registered"
        );

        Ok(Self {
            record: NodeRecordState {
                node_id,
                confirmed_node_id,
                ip,
            },
            config,
            client,
            verifier,
            state: Mutex::new(StateCell {
                state: CoordinatorState::Registered,
                failure: None,
            }),
        })
    }

    pub fn state(&self) -> CoordinatorState {
        self.state.lock().state
    }

    pub fn node_id(&self) -> &str {
        &self.record.confirmed_node_id
    }

    pub fn record(&self) -> &NodeRecordState {
        &self.record
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Publish `value` as a DNS-01 challenge and wait until it is visible
    ///
    /// Returns once both the TXT digest and the node's A record were stable
    /// for the whole window. Dropping the future abandons the cycle and
    /// returns the coordinator to `Registered`.
    pub async fn set_challenge(&self, value: &str) -> ResponderResult<()> {
        let mut cycle = self.begin_cycle()?;

        let txt = ChallengeRequest::txt(&self.record.confirmed_node_id, &self.config.domain, value);
        let digest = txt.expected.clone();
        let a = ChallengeRequest::a(&self.record.confirmed_node_id, &self.config.domain, self.record.ip);

        debug!(
            node_id = %self.record.confirmed_node_id,
            record = %txt.fqdn,
            digest = %digest,
            "Submitting challenge digest"
        );

        let outcome: ResponderResult<()> = async {
            let returned = self.client.submit(RecordType::Txt, &digest).await?;
            confirm_node_id(&self.record.confirmed_node_id, returned)?;

            cycle.advance(CoordinatorState::Verifying);

            self.verifier.verify_request(&txt).await?;
            info!(record = %txt.fqdn, "Challenge TXT record propagated");

            self.verifier.verify_request(&a).await?;
            info!(record = %a.fqdn, "Node A record propagated");
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                cycle.finish(CoordinatorState::Ready, None);
                info!(node_id = %self.record.confirmed_node_id, "Challenge ready for validation");
                Ok(())
            }
            Err(e) => {
                error!(node_id = %self.record.confirmed_node_id, error = %e, "Challenge failed");
                cycle.finish(CoordinatorState::Failed, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// First TXT record at the node's name, segments concatenated
    ///
    /// Read-only; does not touch coordinator state.
    pub async fn get(&self) -> ResponderResult<Option<String>> {
        read_node_record(
            self.verifier.lookup().as_ref(),
            &self.record.confirmed_node_id,
            &self.config.domain,
        )
        .await
    }

    /// Record removal is not offered by the TLD service
    pub async fn remove(&self) -> ResponderResult<()> {
        Err(ResponderError::NotImplemented("remove"))
    }

    fn begin_cycle(&self) -> ResponderResult<CycleGuard<'_>> {
        let mut cell = self.state.lock();
        match cell.state {
            CoordinatorState::Registered | CoordinatorState::Ready => {
                cell.state = CoordinatorState::ChallengeSubmitted;
                Ok(CycleGuard {
                    cell: &self.state,
                    done: false,
                })
            }
            CoordinatorState::Failed => Err(ResponderError::CoordinatorHalted(
                cell.failure
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_string()),
            )),
            CoordinatorState::Constructing
            | CoordinatorState::ChallengeSubmitted
            | CoordinatorState::Verifying => Err(ResponderError::ChallengeInProgress),
        }
    }
}

/// First TXT record at `<node_id>.<domain>`, segments concatenated
///
/// Only resolves; nothing is submitted to the TLD service.
pub async fn read_node_record(
    lookup: &dyn DnsLookup,
    node_id: &str,
    domain: &str,
) -> ResponderResult<Option<String>> {
    let name = node_record_fqdn(node_id, domain);
    let records = lookup.lookup_txt(&name).await?;
    Ok(records.into_iter().next().map(|segments| segments.concat()))
}

/// Compare the service's node ID with the expected one
fn confirm_node_id(expected: &str, returned: String) -> ResponderResult<String> {
    if returned != expected {
        error!(expected = %expected, returned = %returned, "TLD service returned a foreign node ID");
        return Err(ResponderError::AuthenticationMismatch {
            expected: expected.to_string(),
            returned,
        });
    }
    Ok(returned)
}

/// Owns the state of one running challenge cycle
///
/// Dropped unfinished (the caller cancelled), it returns the coordinator to
/// `Registered` so the next challenge can run.
struct CycleGuard<'a> {
    cell: &'a Mutex<StateCell>,
    done: bool,
}

impl CycleGuard<'_> {
    fn advance(&mut self, state: CoordinatorState) {
        self.cell.lock().state = state;
    }

    fn finish(mut self, state: CoordinatorState, failure: Option<String>) {
        let mut cell = self.cell.lock();
        cell.state = state;
        if cell.failure.is_none() {
            cell.failure = failure;
        }
        self.done = true;
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            debug!("Challenge cycle cancelled");
            self.cell.lock().state = CoordinatorState::Registered;
        }
    }
}
