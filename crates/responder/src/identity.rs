//! Node signing identities
//!
//! The responder never creates or persists identities on its own; it only
//! needs the three capabilities of [`Identity`]. [`Ed25519Identity`] is the
//! stock implementation used by the CLI, loaded from a key file or an
//! environment variable.

use std::fmt::Debug;
use std::fs;
use std::path::Path;

use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{ResponderError, ResponderResult};

/// Length in bytes of the digest prefix used as a node ID
const NODE_ID_BYTES: usize = 20;

/// Signing capability that proves ownership of a node's records
///
/// Implementations must derive `node_id` deterministically from the public
/// key: the TLD service recomputes it from `public_key` and the two must agree.
pub trait Identity: Send + Sync + Debug {
    /// Stable identifier derived from the public key, used as a DNS label
    fn node_id(&self) -> String;

    /// Sign arbitrary content
    fn sign(&self, message: &[u8]) -> Vec<u8>;

    /// Raw public key material
    fn public_key(&self) -> Vec<u8>;
}

/// Derive the node ID for a raw public key
///
/// Lowercase hex of the first 20 bytes of `sha256(public_key)`, which keeps
/// the label at 40 characters, well inside the 63 byte DNS label limit.
pub fn derive_node_id(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    hex::encode(&digest[..NODE_ID_BYTES])
}

/// Ed25519 node identity
pub struct Ed25519Identity {
    signing_key: SigningKey,
    node_id: String,
}

impl Debug for Ed25519Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Identity")
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

impl Ed25519Identity {
    /// Generate a fresh identity from the OS entropy source
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self::from_signing_key(SigningKey::generate(&mut rng))
    }

    /// Build an identity from a 32-byte secret seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(&seed))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let node_id = derive_node_id(signing_key.verifying_key().as_bytes());
        Self {
            signing_key,
            node_id,
        }
    }

    /// Parse a hex-encoded 32-byte seed
    pub fn from_hex(encoded: &str) -> ResponderResult<Self> {
        let bytes = hex::decode(encoded.trim()).map_err(|e| {
            ResponderError::IdentityMissing(format!("key is not valid hex: {}", e))
        })?;
        let seed: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            ResponderError::IdentityMissing(format!(
                "key must be 32 bytes, got {} bytes",
                b.len()
            ))
        })?;
        Ok(Self::from_seed(seed))
    }

    /// Hex encoding of the secret seed, the format read by [`Self::from_hex`]
    pub fn to_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Load an identity from a key file
    ///
    /// # Security
    ///
    /// Warns on Unix when the file is readable by group or others.
    pub fn load_from_file(path: &Path) -> ResponderResult<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let metadata = fs::metadata(path).map_err(|e| {
                ResponderError::IdentityMissing(format!(
                    "Failed to read key file '{}': {}",
                    path.display(),
                    e
                ))
            })?;

            let file_mode = metadata.permissions().mode() & 0o777;
            if file_mode & 0o077 != 0 {
                warn!(
                    path = %path.display(),
                    mode = format!("{:o}", file_mode),
                    "Key file has overly permissive permissions (should be 0600 or 0400)"
                );
            }
        }

        let content = fs::read_to_string(path).map_err(|e| {
            ResponderError::IdentityMissing(format!(
                "Failed to read key file '{}': {}",
                path.display(),
                e
            ))
        })?;

        if content.trim().is_empty() {
            return Err(ResponderError::IdentityMissing(format!(
                "Key file '{}' is empty",
                path.display()
            )));
        }

        let identity = Self::from_hex(&content)?;
        debug!(path = %path.display(), node_id = %identity.node_id, "Loaded node identity");
        Ok(identity)
    }

    /// Load an identity from an environment variable
    pub fn load_from_env(var_name: &str) -> ResponderResult<Self> {
        let value = std::env::var(var_name).map_err(|_| {
            ResponderError::IdentityMissing(format!(
                "Environment variable '{}' not set",
                var_name
            ))
        })?;
        Self::from_hex(&value)
    }

    /// Write the seed to `path`, readable by the owner only
    pub fn save_to_file(&self, path: &Path) -> ResponderResult<()> {
        fs::write(path, format!("{}\n", self.to_hex())).map_err(|e| {
            ResponderError::Configuration(format!(
                "Failed to write key file '{}': {}",
                path.display(),
                e
            ))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
                ResponderError::Configuration(format!(
                    "Failed to restrict key file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }
}

impl Identity for Ed25519Identity {
    fn node_id(&self) -> String {
        self.node_id.clone()
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    fn public_key(&self) -> Vec<u8> {
        self.signing_key.verifying_key().to_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SEED_HEX: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    #[test]
    fn test_node_id_is_derived_from_public_key() {
        let identity = Ed25519Identity::from_hex(SEED_HEX).unwrap();
        assert_eq!(identity.node_id(), derive_node_id(&identity.public_key()));
        assert_eq!(identity.node_id().len(), 40);
        assert!(identity.node_id().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_seed_same_node_id() {
        let a = Ed25519Identity::from_hex(SEED_HEX).unwrap();
        let b = Ed25519Identity::from_hex(SEED_HEX).unwrap();
        assert_eq!(a.node_id(), b.node_id());
        assert_eq!(a.to_hex(), SEED_HEX);
    }

    #[test]
    fn test_signature_verifies() {
        let identity = Ed25519Identity::generate();
        let signature = identity.sign(b"203.0.113.7");

        let key_bytes: [u8; 32] = identity.public_key().try_into().unwrap();
        let verifying_key = VerifyingKey::from_bytes(&key_bytes).unwrap();
        let signature = Signature::from_slice(&signature).unwrap();
        assert!(verifying_key.verify(b"203.0.113.7", &signature).is_ok());
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(matches!(
            Ed25519Identity::from_hex("zz"),
            Err(ResponderError::IdentityMissing(_))
        ));
        assert!(matches!(
            Ed25519Identity::from_hex("abcd"),
            Err(ResponderError::IdentityMissing(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "  {}  ", SEED_HEX).unwrap();

        let identity = Ed25519Identity::load_from_file(file.path()).unwrap();
        assert_eq!(identity.to_hex(), SEED_HEX);
    }

    #[test]
    fn test_empty_file_error() {
        let file = NamedTempFile::new().unwrap();
        assert!(Ed25519Identity::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_nonexistent_file() {
        let result = Ed25519Identity::load_from_file(Path::new("/nonexistent/sigdns/node.key"));
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.key");

        let identity = Ed25519Identity::generate();
        identity.save_to_file(&path).unwrap();

        let reloaded = Ed25519Identity::load_from_file(&path).unwrap();
        assert_eq!(reloaded.node_id(), identity.node_id());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn test_load_from_env() {
        std::env::set_var("SIGDNS_TEST_KEY_77821", SEED_HEX);
        let identity = Ed25519Identity::load_from_env("SIGDNS_TEST_KEY_77821").unwrap();
        assert_eq!(identity.to_hex(), SEED_HEX);
        std::env::remove_var("SIGDNS_TEST_KEY_77821");

        assert!(Ed25519Identity::load_from_env("SIGDNS_TEST_KEY_UNSET_77821").is_err());
    }
}
