//! sigdns - DNS-01 challenge responder entry point

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use sigdns_config::{ResponderConfig, DEFAULT_CONFIG_KDL};
use sigdns_responder::{
    node_record_fqdn, read_node_record, resolve, ChallengeCoordinator, Ed25519Identity,
    HickoryLookup, Identity, ResponderOptions,
};

/// sigdns - prove DNS record ownership with signed updates
#[derive(Parser, Debug)]
#[command(name = "sigdns")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "SIGDNS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Key file holding the node's hex-encoded seed (overrides the config)
    #[arg(short = 'k', long = "key-file", env = "SIGDNS_KEY_FILE", global = true)]
    key_file: Option<PathBuf>,

    /// IP address to assert (overrides the config)
    #[arg(long = "ip", global = true)]
    ip: Option<IpAddr>,

    /// Log level when RUST_LOG is not set
    #[arg(long = "log-level", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new node key
    Keygen {
        /// Where to write the key
        #[arg(short = 'o', long = "out")]
        out: PathBuf,

        /// Overwrite an existing key file
        #[arg(long = "force")]
        force: bool,
    },
    /// Print the node ID of the configured key
    NodeId,
    /// Register the node's A record and exit
    Register,
    /// Register, publish a challenge value and wait until it propagated
    Set {
        /// Raw challenge value (key authorization)
        #[arg(long = "value")]
        value: String,

        /// Give up after this many seconds
        #[arg(long = "timeout-secs")]
        timeout_secs: Option<u64>,
    },
    /// Print the TXT record currently published at the node's name (resolve only)
    Get,
    /// Validate the configuration file and exit
    CheckConfig {
        /// Print the sample configuration instead
        #[arg(long = "print-sample")]
        print_sample: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Keygen { out, force } => keygen(out, *force),
        Commands::NodeId => {
            let config = load_config(cli.config.as_deref())?;
            let identity = load_identity(&config, cli.key_file.as_deref())?;
            println!("{}", identity.node_id());
            Ok(())
        }
        Commands::Register => {
            let coordinator = build_coordinator(&cli).await?;
            println!(
                "{}",
                node_record_fqdn(coordinator.node_id(), &coordinator.config().domain)
            );
            Ok(())
        }
        Commands::Set {
            value,
            timeout_secs,
        } => set_challenge(&cli, value, *timeout_secs).await,
        Commands::Get => get_record(&cli).await,
        Commands::CheckConfig { print_sample } => {
            if *print_sample {
                print!("{}", DEFAULT_CONFIG_KDL);
                return Ok(());
            }
            check_config(cli.config.as_deref())
        }
    }
}

fn keygen(out: &Path, force: bool) -> Result<()> {
    if out.exists() && !force {
        bail!(
            "Key file '{}' already exists (use --force to overwrite)",
            out.display()
        );
    }

    let identity = Ed25519Identity::generate();
    identity.save_to_file(out)?;

    info!(path = %out.display(), node_id = %identity.node_id(), "Generated node key");
    println!("{}", identity.node_id());
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ResponderConfig> {
    match path {
        Some(path) => {
            ResponderConfig::from_file(path).context("Failed to load configuration file")
        }
        None => {
            info!("No configuration file given, using defaults");
            Ok(ResponderConfig::default())
        }
    }
}

fn load_identity(config: &ResponderConfig, key_file: Option<&Path>) -> Result<Ed25519Identity> {
    if let Some(path) = key_file.or(config.node.identity_file.as_deref()) {
        return Ok(Ed25519Identity::load_from_file(path)?);
    }
    if let Some(var) = config.node.identity_env.as_deref() {
        return Ok(Ed25519Identity::load_from_env(var)?);
    }
    Err(anyhow!(
        "No node key configured: pass --key-file or set identity-file in the responder block"
    ))
}

async fn build_coordinator(cli: &Cli) -> Result<ChallengeCoordinator> {
    let config = load_config(cli.config.as_deref())?;
    let identity = load_identity(&config, cli.key_file.as_deref())?;

    let mut options = ResponderOptions::from_config(&config).with_identity(Arc::new(identity));
    if let Some(ip) = cli.ip {
        options = options.with_ip(ip);
    }

    let resolved = resolve(options)?;
    let coordinator = ChallengeCoordinator::register(resolved)
        .await
        .context("Node registration failed")?;
    Ok(coordinator)
}

async fn get_record(cli: &Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let identity = load_identity(&config, cli.key_file.as_deref())?;
    let lookup = HickoryLookup::new(&config.propagation.nameservers)?;

    match read_node_record(&lookup, &identity.node_id(), &config.node.domain).await? {
        Some(record) => println!("{}", record),
        None => println!("(no record)"),
    }
    Ok(())
}

async fn set_challenge(cli: &Cli, value: &str, timeout_secs: Option<u64>) -> Result<()> {
    let coordinator = build_coordinator(cli).await?;

    let cycle = coordinator.set_challenge(value);
    match timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), cycle)
            .await
            .map_err(|_| anyhow!("Challenge did not propagate within {} seconds", secs))??,
        None => cycle.await?,
    }

    println!("ready");
    Ok(())
}

fn check_config(path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        bail!("No configuration file given (use -c or SIGDNS_CONFIG)");
    };

    info!("Testing configuration file: {}", path.display());
    let config = ResponderConfig::from_file(path).context("Failed to load configuration file")?;

    if config.node.ip.is_none() {
        warn!("No ip configured; pass --ip when registering");
    }
    if config.node.identity_file.is_none() && config.node.identity_env.is_none() {
        warn!("No identity-file or identity-env configured; pass --key-file");
    }
    if config.propagation.timeout_secs.is_none() {
        warn!("No propagation timeout configured; verification may wait indefinitely");
    }

    println!(
        "sigdns: configuration file {} test is successful",
        path.display()
    );
    Ok(())
}
