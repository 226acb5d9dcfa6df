//! Pluggable signature backends
//!
//! Every backend implements the same [`CryptoBackend`] contract:
//!
//! - `key_gen() -> private key`
//! - `private_key_to_pub_key(private key) -> public key`
//! - `hash(msg) -> digest`
//! - `sign(private key, msg) -> DER signature`
//! - `verify(public key, signature, msg) -> bool`
//!
//! `sign` and `verify` take the *message*, apply the backend digest exactly
//! once, and sign/verify that digest. Callers (the sighash calculator, the
//! engine) never pre-hash.
//!
//! The trait is sealed: the only implementations are the three algorithm
//! backends and the [`Crypto`] dispatcher. A node picks one algorithm at
//! start-up and passes the backend down by reference.

pub mod der;
mod gm;
mod nistp256;
mod s256;

pub use gm::Sm2Backend;
pub use nistp256::P256Backend;
pub use s256::Secp256k1Backend;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::PRIVATE_KEY_SIZE;
use crate::error::{Result, ScriptError};

mod sealed {
    pub trait Sealed {}
}

/// Uniform signing interface over the supported curves
pub trait CryptoBackend: sealed::Sealed + Send + Sync + fmt::Debug {
    fn algorithm(&self) -> CryptoAlgorithm;

    /// Generate a fresh 32-byte private key
    fn key_gen(&self) -> Result<Vec<u8>>;

    /// Serialized public key for a private key
    fn private_key_to_pub_key(&self, private_key: &[u8]) -> Result<Vec<u8>>;

    /// Backend digest of `msg`
    fn hash(&self, msg: &[u8]) -> Vec<u8>;

    /// DER signature over the backend digest of `msg`.
    ///
    /// Fails when the private key is not a scalar in `[1, n-1]`.
    fn sign(&self, private_key: &[u8], msg: &[u8]) -> Result<Vec<u8>>;

    /// Check a DER signature over `msg`. Never fails; malformed input is
    /// simply not a valid signature.
    fn verify(&self, pub_key: &[u8], signature: &[u8], msg: &[u8]) -> bool;
}

/// Signature algorithm selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CryptoAlgorithm {
    /// secp256k1 with Keccak-256
    #[default]
    Secp256k1,
    /// NIST P-256 with SHA-256
    P256,
    /// SM2 with SM3
    Sm2,
}

impl fmt::Display for CryptoAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CryptoAlgorithm::Secp256k1 => "secp256k1",
            CryptoAlgorithm::P256 => "p256",
            CryptoAlgorithm::Sm2 => "sm2",
        };
        f.write_str(name)
    }
}

impl FromStr for CryptoAlgorithm {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "secp256k1" | "s256" => Ok(CryptoAlgorithm::Secp256k1),
            "p256" | "p-256" | "secp256r1" => Ok(CryptoAlgorithm::P256),
            "sm2" | "gm" => Ok(CryptoAlgorithm::Sm2),
            other => Err(ScriptError::Config(format!("unknown crypto algorithm '{}'", other))),
        }
    }
}

/// The backend selected for this process, one variant per algorithm
#[derive(Debug)]
pub enum Crypto {
    Secp256k1(Secp256k1Backend),
    P256(P256Backend),
    Sm2(Sm2Backend),
}

impl Crypto {
    pub fn new(algorithm: CryptoAlgorithm) -> Self {
        match algorithm {
            CryptoAlgorithm::Secp256k1 => Crypto::Secp256k1(Secp256k1Backend::new()),
            CryptoAlgorithm::P256 => Crypto::P256(P256Backend),
            CryptoAlgorithm::Sm2 => Crypto::Sm2(Sm2Backend),
        }
    }

    fn backend(&self) -> &dyn CryptoBackend {
        match self {
            Crypto::Secp256k1(b) => b,
            Crypto::P256(b) => b,
            Crypto::Sm2(b) => b,
        }
    }
}

impl Default for Crypto {
    fn default() -> Self {
        Crypto::new(CryptoAlgorithm::default())
    }
}

impl sealed::Sealed for Crypto {}

impl CryptoBackend for Crypto {
    fn algorithm(&self) -> CryptoAlgorithm {
        self.backend().algorithm()
    }

    fn key_gen(&self) -> Result<Vec<u8>> {
        self.backend().key_gen()
    }

    fn private_key_to_pub_key(&self, private_key: &[u8]) -> Result<Vec<u8>> {
        self.backend().private_key_to_pub_key(private_key)
    }

    fn hash(&self, msg: &[u8]) -> Vec<u8> {
        self.backend().hash(msg)
    }

    fn sign(&self, private_key: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
        self.backend().sign(private_key, msg)
    }

    fn verify(&self, pub_key: &[u8], signature: &[u8], msg: &[u8]) -> bool {
        self.backend().verify(pub_key, signature, msg)
    }
}

fn check_private_key_len(private_key: &[u8]) -> Result<()> {
    if private_key.len() != PRIVATE_KEY_SIZE {
        return Err(ScriptError::Crypto(format!(
            "private key must be {} bytes, got {}",
            PRIVATE_KEY_SIZE,
            private_key.len()
        )));
    }
    Ok(())
}
