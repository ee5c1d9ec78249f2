//! DNS propagation verification
//!
//! After the TLD service accepts an update, the record still has to become
//! visible through public resolution before a CA is asked to look. The
//! verifier polls once per interval and only succeeds after the expected
//! value was observed on `stability_threshold` consecutive polls; a single
//! mismatch or lookup error restarts the window, which filters out cached
//! and partially propagated answers.

use std::fmt::Debug;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{Resolver, TokioResolver};
use tracing::{debug, trace, warn};

use crate::error::{ResponderError, ResponderResult};
use crate::record::{ChallengeRequest, RecordType};
use crate::sleep::Sleeper;

/// Polling cadence used by the certificate issuance flow
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Consecutive matching polls required before success
pub const DEFAULT_STABILITY_THRESHOLD: u32 = 60;

/// Read-only DNS resolution used by the verifier
#[async_trait]
pub trait DnsLookup: Send + Sync + Debug {
    /// Addresses of the A records at `name`, in answer order
    async fn lookup_a(&self, name: &str) -> ResponderResult<Vec<IpAddr>>;

    /// TXT records at `name`; each record is its list of character strings
    async fn lookup_txt(&self, name: &str) -> ResponderResult<Vec<Vec<String>>>;
}

/// Polling settings for verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationSettings {
    pub check_interval: Duration,
    pub stability_threshold: u32,
    /// Ceiling on one verification; `None` polls until success
    pub timeout: Option<Duration>,
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            timeout: None,
        }
    }
}

impl PropagationSettings {
    /// The timeout expressed as a number of polls
    ///
    /// Counting polls rather than reading a clock keeps the ceiling exact
    /// under an injected sleeper.
    pub fn poll_budget(&self) -> Option<u64> {
        self.timeout.map(|timeout| {
            let interval = self.check_interval.as_millis().max(1);
            let polls = timeout.as_millis().div_ceil(interval);
            (polls.min(u64::MAX as u128) as u64).max(1)
        })
    }
}

/// Verifies that a record is consistently visible in public DNS
#[derive(Debug, Clone)]
pub struct PropagationVerifier {
    settings: PropagationSettings,
    lookup: Arc<dyn DnsLookup>,
    sleeper: Arc<dyn Sleeper>,
}

impl PropagationVerifier {
    pub fn new(
        settings: PropagationSettings,
        lookup: Arc<dyn DnsLookup>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            settings,
            lookup,
            sleeper,
        }
    }

    pub fn settings(&self) -> &PropagationSettings {
        &self.settings
    }

    pub fn lookup(&self) -> &Arc<dyn DnsLookup> {
        &self.lookup
    }

    /// Verify a prepared [`ChallengeRequest`]
    pub async fn verify_request(&self, request: &ChallengeRequest) -> ResponderResult<()> {
        self.verify(&request.fqdn, request.record_type, &request.expected)
            .await
    }

    /// Wait until `name` resolves to `expected` for the whole stability window
    ///
    /// For A records the first returned address is compared, for TXT records
    /// the first string of the first record. Every call keeps its own
    /// counter, so concurrent verifications never interact. The loop only
    /// awaits on lookups and the sleeper and can be dropped at any point.
    pub async fn verify(
        &self,
        name: &str,
        record_type: RecordType,
        expected: &str,
    ) -> ResponderResult<()> {
        let threshold = self.settings.stability_threshold;
        let budget = self.settings.poll_budget();
        let mut consecutive_matches: u32 = 0;
        let mut polls: u64 = 0;

        debug!(
            record = %name,
            record_type = %record_type,
            expected = %expected,
            threshold,
            "Waiting for DNS propagation"
        );

        loop {
            polls += 1;

            match self.observe(name, record_type).await {
                Ok(Some(found)) if found == expected => {
                    consecutive_matches += 1;
                    trace!(record = %name, consecutive_matches, "Record matches");
                }
                Ok(found) => {
                    if consecutive_matches > 0 {
                        debug!(
                            record = %name,
                            found = ?found,
                            expected = %expected,
                            lost = consecutive_matches,
                            "Record changed, restarting stability window"
                        );
                    } else {
                        trace!(record = %name, found = ?found, "Record not yet propagated");
                    }
                    consecutive_matches = 0;
                }
                Err(e) => {
                    warn!(record = %name, error = %e, "DNS lookup error");
                    consecutive_matches = 0;
                }
            }

            if consecutive_matches >= threshold {
                debug!(record = %name, polls, "DNS propagation confirmed");
                return Ok(());
            }

            if let Some(budget) = budget {
                if polls >= budget {
                    return Err(ResponderError::PropagationTimeout {
                        record: name.to_string(),
                        polls,
                    });
                }
            }

            self.sleeper.sleep(self.settings.check_interval).await;
        }
    }

    /// The value a single poll observes, if any
    async fn observe(&self, name: &str, record_type: RecordType) -> ResponderResult<Option<String>> {
        match record_type {
            RecordType::A => {
                let addrs = self.lookup.lookup_a(name).await?;
                Ok(addrs.first().map(|ip| ip.to_string()))
            }
            RecordType::Txt => {
                let records = self.lookup.lookup_txt(name).await?;
                Ok(records
                    .into_iter()
                    .next()
                    .and_then(|segments| segments.into_iter().next()))
            }
        }
    }
}

// ============================================================================
// hickory-backed lookup
// ============================================================================

/// [`DnsLookup`] over recursive resolvers via hickory
#[derive(Debug)]
pub struct HickoryLookup {
    resolver: TokioResolver,
}

impl HickoryLookup {
    /// Create a lookup against `nameservers`, or the system configuration if empty
    ///
    /// The system configuration is read from `/etc/resolv.conf` (or the
    /// platform equivalent); failing to read it is a configuration error.
    pub fn new(nameservers: &[IpAddr]) -> ResponderResult<Self> {
        let builder = if nameservers.is_empty() {
            Resolver::builder_tokio().map_err(|e| {
                ResponderError::Configuration(format!(
                    "Failed to read system resolver configuration: {}",
                    e
                ))
            })?
        } else {
            let mut resolver_config = ResolverConfig::new();
            for ip in nameservers {
                resolver_config.add_name_server(NameServerConfig::new(
                    SocketAddr::new(*ip, 53),
                    Protocol::Udp,
                ));
            }
            Resolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
        };

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 3;
        opts.cache_size = 0; // Every poll must reach the network

        let resolver = builder.with_options(opts).build();

        Ok(Self { resolver })
    }

    /// NXDOMAIN and empty answers are normal during propagation
    fn is_absent(message: &str) -> bool {
        let lowered = message.to_lowercase();
        lowered.contains("no records found")
            || lowered.contains("no record found")
            || lowered.contains("nxdomain")
            || lowered.contains("record not found")
    }
}

#[async_trait]
impl DnsLookup for HickoryLookup {
    async fn lookup_a(&self, name: &str) -> ResponderResult<Vec<IpAddr>> {
        match self.resolver.ipv4_lookup(name).await {
            Ok(lookup) => Ok(lookup.iter().map(|a| IpAddr::V4(a.0)).collect()),
            Err(e) if Self::is_absent(&e.to_string()) => Ok(Vec::new()),
            Err(e) => Err(ResponderError::Resolution {
                record: name.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn lookup_txt(&self, name: &str) -> ResponderResult<Vec<Vec<String>>> {
        match self.resolver.txt_lookup(name).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|record| {
                    record
                        .txt_data()
                        .iter()
                        .map(|data| String::from_utf8_lossy(data).into_owned())
                        .collect()
                })
                .collect()),
            Err(e) if Self::is_absent(&e.to_string()) => Ok(Vec::new()),
            Err(e) => Err(ResponderError::Resolution {
                record: name.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicU64, Ordering};

    type Script = Box<dyn Fn(u64) -> ResponderResult<Vec<Vec<String>>> + Send + Sync>;

    /// Answers TXT polls from a script keyed by 1-based poll number
    struct ScriptedLookup {
        script: Script,
        polls: AtomicU64,
    }

    impl Debug for ScriptedLookup {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ScriptedLookup").finish()
        }
    }

    impl ScriptedLookup {
        fn new(script: impl Fn(u64) -> ResponderResult<Vec<Vec<String>>> + Send + Sync + 'static) -> Self {
            Self {
                script: Box::new(script),
                polls: AtomicU64::new(0),
            }
        }

        fn polls(&self) -> u64 {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DnsLookup for ScriptedLookup {
        async fn lookup_a(&self, _name: &str) -> ResponderResult<Vec<IpAddr>> {
            let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            let answer = (self.script)(poll)?;
            Ok(answer
                .into_iter()
                .filter_map(|r| r.first().and_then(|s| s.parse().ok()))
                .collect())
        }

        async fn lookup_txt(&self, _name: &str) -> ResponderResult<Vec<Vec<String>>> {
            let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            (self.script)(poll)
        }
    }

    #[derive(Debug, Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().push(duration);
        }
    }

    fn txt(value: &str) -> Vec<Vec<String>> {
        vec![vec![value.to_string()]]
    }

    fn verifier(
        lookup: Arc<ScriptedLookup>,
        sleeper: Arc<RecordingSleeper>,
        timeout: Option<Duration>,
    ) -> PropagationVerifier {
        PropagationVerifier::new(
            PropagationSettings {
                timeout,
                ..PropagationSettings::default()
            },
            lookup,
            sleeper,
        )
    }

    #[test]
    fn test_default_settings() {
        let settings = PropagationSettings::default();
        assert_eq!(settings.check_interval, Duration::from_secs(1));
        assert_eq!(settings.stability_threshold, 60);
        assert!(settings.timeout.is_none());
        assert!(settings.poll_budget().is_none());
    }

    #[test]
    fn test_poll_budget() {
        let settings = PropagationSettings {
            timeout: Some(Duration::from_millis(2500)),
            ..PropagationSettings::default()
        };
        assert_eq!(settings.poll_budget(), Some(3));

        let settings = PropagationSettings {
            timeout: Some(Duration::ZERO),
            ..PropagationSettings::default()
        };
        assert_eq!(settings.poll_budget(), Some(1));
    }

    #[tokio::test]
    async fn test_terminates_after_sixtieth_match() {
        let lookup = Arc::new(ScriptedLookup::new(|_| Ok(txt("digest"))));
        let sleeper = Arc::new(RecordingSleeper::default());

        verifier(lookup.clone(), sleeper.clone(), None)
            .verify("_acme-challenge.node.storj.farm", RecordType::Txt, "digest")
            .await
            .unwrap();

        assert_eq!(lookup.polls(), 60);
        let delays = sleeper.delays.lock().clone();
        assert_eq!(delays.len(), 59);
        assert!(delays.iter().all(|d| *d == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_mismatch_at_sixty_restarts_window() {
        // Match on 1-59, wrong value on 60, then match forever
        let script = |poll: u64| {
            if poll == 60 {
                Ok(txt("stale"))
            } else {
                Ok(txt("digest"))
            }
        };

        // With a budget of 119 polls only 59 matches follow the reset
        let lookup = Arc::new(ScriptedLookup::new(script));
        let sleeper = Arc::new(RecordingSleeper::default());
        let result = verifier(lookup.clone(), sleeper, Some(Duration::from_secs(119)))
            .verify("name", RecordType::Txt, "digest")
            .await;
        assert!(matches!(
            result,
            Err(ResponderError::PropagationTimeout { polls: 119, .. })
        ));
        assert_eq!(lookup.polls(), 119);

        // Unbounded, success needs 60 fresh matches: polls 61 through 120
        let lookup = Arc::new(ScriptedLookup::new(script));
        let sleeper = Arc::new(RecordingSleeper::default());
        verifier(lookup.clone(), sleeper, None)
            .verify("name", RecordType::Txt, "digest")
            .await
            .unwrap();
        assert_eq!(lookup.polls(), 120);
    }

    #[tokio::test]
    async fn test_lookup_error_resets_window() {
        let script = |poll: u64| {
            if poll == 30 {
                Err(ResponderError::Resolution {
                    record: "name".to_string(),
                    message: "SERVFAIL".to_string(),
                })
            } else {
                Ok(txt("digest"))
            }
        };
        let lookup = Arc::new(ScriptedLookup::new(script));
        verifier(lookup.clone(), Arc::new(RecordingSleeper::default()), None)
            .verify("name", RecordType::Txt, "digest")
            .await
            .unwrap();
        assert_eq!(lookup.polls(), 90);
    }

    #[tokio::test]
    async fn test_absent_record_never_matches() {
        let lookup = Arc::new(ScriptedLookup::new(|_| Ok(Vec::new())));
        let result = verifier(
            lookup.clone(),
            Arc::new(RecordingSleeper::default()),
            Some(Duration::from_secs(10)),
        )
        .verify("name", RecordType::Txt, "digest")
        .await;
        assert!(matches!(result, Err(ResponderError::PropagationTimeout { .. })));
        assert_eq!(lookup.polls(), 10);
    }

    #[tokio::test]
    async fn test_txt_compares_first_segment_of_first_record() {
        let lookup = Arc::new(ScriptedLookup::new(|_| {
            Ok(vec![
                vec!["digest".to_string(), "trailing".to_string()],
                vec!["other".to_string()],
            ])
        }));
        verifier(lookup.clone(), Arc::new(RecordingSleeper::default()), None)
            .verify("name", RecordType::Txt, "digest")
            .await
            .unwrap();
        assert_eq!(lookup.polls(), 60);

        // A later record carrying the value does not count
        let lookup = Arc::new(ScriptedLookup::new(|_| {
            Ok(vec![vec!["other".to_string()], vec!["digest".to_string()]])
        }));
        let result = verifier(
            lookup,
            Arc::new(RecordingSleeper::default()),
            Some(Duration::from_secs(70)),
        )
        .verify("name", RecordType::Txt, "digest")
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_a_compares_first_address() {
        let lookup = Arc::new(ScriptedLookup::new(|_| {
            Ok(vec![vec!["203.0.113.7".to_string()], vec!["198.51.100.1".to_string()]])
        }));
        verifier(lookup.clone(), Arc::new(RecordingSleeper::default()), None)
            .verify("node.storj.farm", RecordType::A, &Ipv4Addr::new(203, 0, 113, 7).to_string())
            .await
            .unwrap();
        assert_eq!(lookup.polls(), 60);

        let lookup = Arc::new(ScriptedLookup::new(|_| {
            Ok(vec![vec!["198.51.100.1".to_string()], vec!["203.0.113.7".to_string()]])
        }));
        let result = verifier(
            lookup,
            Arc::new(RecordingSleeper::default()),
            Some(Duration::from_secs(61)),
        )
        .verify("node.storj.farm", RecordType::A, "203.0.113.7")
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_verifications_are_independent() {
        let fast = Arc::new(ScriptedLookup::new(|_| Ok(txt("a"))));
        let slow = Arc::new(ScriptedLookup::new(|poll| {
            if poll <= 10 {
                Ok(txt("old"))
            } else {
                Ok(txt("b"))
            }
        }));
        let sleeper = Arc::new(RecordingSleeper::default());

        let first = verifier(fast.clone(), sleeper.clone(), None);
        let second = verifier(slow.clone(), sleeper, None);

        let (a, b) = tokio::join!(
            first.verify("a.storj.farm", RecordType::Txt, "a"),
            second.verify("b.storj.farm", RecordType::Txt, "b"),
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(fast.polls(), 60);
        assert_eq!(slow.polls(), 70);
    }

    #[tokio::test]
    async fn test_hickory_lookup_creation() {
        assert!(HickoryLookup::new(&[IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))]).is_ok());
    }

    #[tokio::test]
    async fn test_empty_nameservers_use_system_configuration() {
        // Hosts without a readable resolv.conf report a configuration error
        match HickoryLookup::new(&[]) {
            Ok(_) => {}
            Err(ResponderError::Configuration(message)) => {
                assert!(message.contains("system resolver configuration"));
            }
            Err(other) => panic!("expected Configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_absent_classification() {
        assert!(HickoryLookup::is_absent("no records found for Query"));
        assert!(HickoryLookup::is_absent("NXDomain response"));
        assert!(HickoryLookup::is_absent("no record found for Query { name: Name(\"x.\") }"));
        assert!(!HickoryLookup::is_absent("request timed out"));
    }
}
