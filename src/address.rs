//! Ledger addresses
//!
//! An address is a 20-byte hash tagged with what it commits to. Its text
//! form is `"P" + base58check(version, hash)`.

use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::constants::HASH160_SIZE;
use crate::error::{Result, ScriptError};

/// RIPEMD160(SHA256(data)), the hash used for every address and OP_HASH160
pub fn hash160(data: &[u8]) -> [u8; HASH160_SIZE] {
    let sha = Sha256::digest(data);
    let rip = Ripemd160::digest(sha);
    let mut out = [0u8; HASH160_SIZE];
    out.copy_from_slice(&rip);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressType {
    PublicKeyHash,
    ScriptHash,
    ContractHash,
}

impl AddressType {
    pub fn version(self) -> u8 {
        match self {
            AddressType::PublicKeyHash => 0,
            AddressType::ScriptHash => 5,
            AddressType::ContractHash => 28,
        }
    }

    pub fn from_version(version: u8) -> Option<Self> {
        match version {
            0 => Some(AddressType::PublicKeyHash),
            5 => Some(AddressType::ScriptHash),
            28 => Some(AddressType::ContractHash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub kind: AddressType,
    pub hash: [u8; HASH160_SIZE],
}

impl Address {
    pub fn new(kind: AddressType, hash: [u8; HASH160_SIZE]) -> Self {
        Self { kind, hash }
    }

    /// Build from a hash slice, which must be exactly 20 bytes
    pub fn from_hash_slice(kind: AddressType, hash: &[u8]) -> Result<Self> {
        let hash: [u8; HASH160_SIZE] = hash
            .try_into()
            .map_err(|_| ScriptError::InvalidAddress(format!("hash must be 20 bytes, got {}", hash.len())))?;
        Ok(Self { kind, hash })
    }

    /// Pay-to-public-key-hash address of a serialized public key
    pub fn from_pubkey(pubkey: &[u8]) -> Self {
        Self::new(AddressType::PublicKeyHash, hash160(pubkey))
    }

    /// Pay-to-script-hash address of a redeem script
    pub fn from_script(script: &[u8]) -> Self {
        Self::new(AddressType::ScriptHash, hash160(script))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.hash
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = bs58::encode(self.hash)
            .with_check_version(self.kind.version())
            .into_string();
        write!(f, "P{}", encoded)
    }
}

impl FromStr for Address {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self> {
        let body = s
            .strip_prefix('P')
            .ok_or_else(|| ScriptError::InvalidAddress(format!("{} must start with 'P'", s)))?;
        let decoded = bs58::decode(body)
            .with_check(None)
            .into_vec()
            .map_err(|e| ScriptError::InvalidAddress(format!("{}: {}", s, e)))?;
        let (version, hash) = decoded
            .split_first()
            .ok_or_else(|| ScriptError::InvalidAddress(format!("{} is empty", s)))?;
        let kind = AddressType::from_version(*version)
            .ok_or_else(|| ScriptError::InvalidAddress(format!("{} has unknown version {}", s, version)))?;
        Address::from_hash_slice(kind, hash)
    }
}

/// An address recovered from a script together with the raw bytes
/// (public key or hash) it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressOriginalData {
    pub address: Address,
    pub original: Vec<u8>,
}
