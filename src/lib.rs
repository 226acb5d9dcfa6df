//! # Token-Script
//!
//! Script language, signer and validation engine for UTXO token payments.
//!
//! Every payment input carries an unlock script that must satisfy the lock
//! script of the output it spends. This crate builds and parses those
//! scripts, signs inputs (including multi-party multisig and contract
//! spends), and executes scripts to decide whether a spend is authorized.
//!
//! ## Architecture
//!
//! - [`script`], [`opcodes`]: byte encoding of scripts
//! - [`standard`]: recognizing and generating standard lock scripts
//! - [`sighash`], [`serialization`]: what a signature commits to
//! - [`crypto`]: secp256k1, P-256 and SM2 signature backends
//! - [`sign`]: unlock script construction and multisig merging
//! - [`engine`]: the stack machine that validates spends
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: validation has no side effects besides the optional
//!    signature cache
//! 2. **Injected Crypto**: one backend is chosen at start-up and passed down;
//!    there is no global algorithm switch
//! 3. **Exact Version Pinning**: all consensus-critical dependencies are pinned
//!    to exact versions
//! 4. **No Panics on Input**: hostile scripts produce structured errors
//!
//! ## Usage
//!
//! ```rust
//! use token_script::TokenEngine;
//! use token_script::opcodes::*;
//!
//! let engine = TokenEngine::new();
//! let script = engine.generate_p2pkh_lock_script(&[0u8; 20]).unwrap();
//! assert_eq!(script[0], OP_DUP);
//! ```

pub mod address;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod opcodes;
pub mod script;
pub mod serialization;
pub mod sigcache;
pub mod sighash;
pub mod sign;
pub mod standard;
pub mod types;

use std::sync::Arc;
use tracing::debug;

// Re-export commonly used types
pub use address::{Address, AddressType};
pub use config::EngineConfig;
pub use crypto::{Crypto, CryptoAlgorithm, CryptoBackend};
pub use engine::ValidateOptions;
pub use error::{ExecutionFailure, Result, ScriptError};
pub use sighash::SigHashType;
pub use sign::{KeyStore, MemoryKeyStore, MergedUnlock, ScriptDb, SignatureError};
pub use standard::ScriptClass;
pub use types::*;

/// Script engine bound to one crypto backend and one signature cache
///
/// # Examples
///
/// ```
/// use token_script::{EngineConfig, TokenEngine, CryptoAlgorithm};
///
/// let config = EngineConfig { algorithm: CryptoAlgorithm::P256, sig_cache_size: 100 };
/// let engine = TokenEngine::from_config(&config);
/// assert_eq!(engine.algorithm(), CryptoAlgorithm::P256);
/// ```
#[derive(Debug, Clone)]
pub struct TokenEngine {
    crypto: Arc<Crypto>,
    sig_cache: Arc<sigcache::SigCache>,
}

impl TokenEngine {
    /// Engine with the default configuration (secp256k1)
    pub fn new() -> Self {
        Self::from_config(&EngineConfig::default())
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        debug!("token engine using {} with sig cache of {}", config.algorithm, config.sig_cache_size);
        Self {
            crypto: Arc::new(Crypto::new(config.algorithm)),
            sig_cache: Arc::new(sigcache::SigCache::new(config.sig_cache_size)),
        }
    }

    pub fn algorithm(&self) -> CryptoAlgorithm {
        self.crypto.algorithm()
    }

    /// The shared backend, for building key stores
    pub fn crypto(&self) -> Arc<Crypto> {
        self.crypto.clone()
    }

    pub fn sig_cache(&self) -> &sigcache::SigCache {
        &self.sig_cache
    }

    /// Empty in-memory key store on this engine's backend
    pub fn new_key_store(&self) -> MemoryKeyStore {
        MemoryKeyStore::new(self.crypto.clone())
    }

    pub fn generate_p2pkh_lock_script(&self, pub_key_hash: &[u8; 20]) -> Result<Vec<u8>> {
        standard::p2pkh_lock_script(pub_key_hash)
    }

    pub fn generate_p2sh_lock_script(&self, redeem_script_hash: &[u8; 20]) -> Result<Vec<u8>> {
        standard::p2sh_lock_script(redeem_script_hash)
    }

    pub fn generate_p2ch_lock_script(&self, contract_hash: &[u8; 20]) -> Result<Vec<u8>> {
        standard::p2ch_lock_script(contract_hash)
    }

    /// Lock script paying to `address`
    ///
    /// # Examples
    ///
    /// ```
    /// use token_script::{Address, TokenEngine};
    ///
    /// let engine = TokenEngine::new();
    /// let contract: Address = "PCGTta3M4t3yXu8uRgkKvaWd2d8DR32W9vM".parse().unwrap();
    /// let lock = engine.generate_lock_script(&contract).unwrap();
    /// assert_eq!(engine.get_address_from_script(&lock).unwrap(), contract);
    /// ```
    pub fn generate_lock_script(&self, address: &Address) -> Result<Vec<u8>> {
        standard::lock_script_for_address(address)
    }

    /// m-of-n redeem script over `pub_keys`, keys sorted descending
    pub fn generate_redeem_script(&self, required: usize, pub_keys: &[Vec<u8>]) -> Result<Vec<u8>> {
        standard::multisig_redeem_script(required, pub_keys)
    }

    /// Script-hash or contract-hash address of a redeem script
    pub fn get_redeem_address(&self, kind: AddressType, redeem_script: &[u8]) -> Address {
        standard::redeem_script_address(kind, redeem_script)
    }

    pub fn get_address_from_script(&self, lock_script: &[u8]) -> Result<Address> {
        standard::address_from_lock_script(lock_script)
    }

    pub fn disasm_string(&self, script: &[u8]) -> Result<String> {
        script::disasm_string(script)
    }

    pub fn is_unspendable(&self, script: &[u8]) -> bool {
        script::is_unspendable(script)
    }

    pub fn calc_signature_hash(
        &self,
        tx: &Transaction,
        hash_type: SigHashType,
        msg_idx: usize,
        input_idx: usize,
        lock_or_redeem_script: &[u8],
    ) -> Result<Vec<u8>> {
        sighash::calc_signature_hash(&*self.crypto, lock_or_redeem_script, hash_type, tx, msg_idx, input_idx)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn sign_one_payment_input(
        &self,
        tx: &Transaction,
        msg_idx: usize,
        input_idx: usize,
        lock_script: &[u8],
        hash_type: SigHashType,
        keys: &dyn KeyStore,
        scripts: &dyn ScriptDb,
        previous_script: &[u8],
    ) -> Result<Vec<u8>> {
        sign::sign_one_payment_input(
            &*self.crypto,
            tx,
            msg_idx,
            input_idx,
            lock_script,
            hash_type,
            keys,
            scripts,
            previous_script,
        )
    }

    pub fn sign_tx_all_payment_inputs(
        &self,
        tx: &mut Transaction,
        hash_type: SigHashType,
        utxos: &dyn UtxoView,
        keys: &dyn KeyStore,
        scripts: &dyn ScriptDb,
    ) -> std::result::Result<(), Vec<SignatureError>> {
        sign::sign_tx_all_payment_inputs(&*self.crypto, tx, hash_type, utxos, keys, scripts)
    }

    pub fn get_script_signers(&self, tx: &Transaction, msg_idx: usize, input_idx: usize) -> Result<Vec<Address>> {
        sign::script_signers(&*self.crypto, tx, msg_idx, input_idx)
    }

    pub fn merge_contract_unlock_script(&self, signatures: &[Vec<u8>], redeem_script: &[u8]) -> Result<Vec<u8>> {
        sign::merge_contract_unlock_script(signatures, redeem_script)
    }

    /// Validate one input against the lock script it spends, using this
    /// engine's signature cache
    pub fn script_validate(
        &self,
        lock_script: &[u8],
        tx: &Transaction,
        msg_idx: usize,
        input_idx: usize,
        script_db: Option<&dyn ScriptDb>,
    ) -> Result<()> {
        let options = ValidateOptions { sig_cache: Some(&self.sig_cache), script_db };
        engine::script_validate(&*self.crypto, lock_script, tx, msg_idx, input_idx, options)
    }

    /// Validate every input of one payment message
    pub fn script_validate_message(
        &self,
        utxos: &dyn UtxoView,
        tx: &Transaction,
        msg_idx: usize,
        script_db: Option<&dyn ScriptDb>,
    ) -> Result<()> {
        let options = ValidateOptions { sig_cache: Some(&self.sig_cache), script_db };
        engine::script_validate_message(&*self.crypto, utxos, tx, msg_idx, options)
    }
}

impl Default for TokenEngine {
    fn default() -> Self {
        Self::new()
    }
}
