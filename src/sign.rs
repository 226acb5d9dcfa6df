//! Unlock script construction and multisig merging
//!
//! The signer classifies the lock script being spent and produces the
//! matching unlock script:
//!
//! | lock script      | unlock script                        |
//! |------------------|--------------------------------------|
//! | pay-to-pubkey-hash | `<sig> <pubkey>`                   |
//! | pay-to-pubkey    | `<sig>`                              |
//! | m-of-n multisig  | `OP_0 <sig>...`                      |
//! | script / contract hash | unlock for the redeem script, then `<redeem>` |
//!
//! Multisig spends are usually assembled by several parties. Every party
//! signs with the keys it holds and merges its signatures into whatever
//! partial script it received; [`merge_partial_multisig`] rebuilds the
//! key/signature binding from scratch each time, so merges can happen in
//! any order and any number of times.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::address::{Address, AddressOriginalData};
use crate::crypto::{Crypto, CryptoBackend};
use crate::error::{Result, ScriptError};
use crate::opcodes::*;
use crate::script::{parse_script, ScriptBuilder};
use crate::sighash::{calc_signature_data, split_signature, SigHashType};
use crate::standard::{extract_pk_script_addrs, multisig_keys, ScriptClass};
use crate::types::{Transaction, UtxoView};

/// Private key access by address
pub trait KeyStore {
    /// Serialized public key behind `address`, if this store holds it
    fn public_key(&self, address: &Address) -> Option<Vec<u8>>;

    /// DER signature over `msg` (hashed by the backend) with the key behind
    /// `address`. Fails with [`ScriptError::KeyNotFound`] for unknown keys.
    fn sign(&self, address: &Address, msg: &[u8]) -> Result<Vec<u8>>;
}

/// Redeem script lookup by script-hash or contract-hash address
pub trait ScriptDb: Send + Sync {
    fn script(&self, address: &Address) -> Option<Vec<u8>>;
}

/// [`KeyStore`] backed by two closures
pub struct KeyClosure<P, S> {
    public_key: P,
    sign: S,
}

impl<P, S> KeyClosure<P, S>
where
    P: Fn(&Address) -> Option<Vec<u8>>,
    S: Fn(&Address, &[u8]) -> Result<Vec<u8>>,
{
    pub fn new(public_key: P, sign: S) -> Self {
        Self { public_key, sign }
    }
}

impl<P, S> KeyStore for KeyClosure<P, S>
where
    P: Fn(&Address) -> Option<Vec<u8>>,
    S: Fn(&Address, &[u8]) -> Result<Vec<u8>>,
{
    fn public_key(&self, address: &Address) -> Option<Vec<u8>> {
        (self.public_key)(address)
    }

    fn sign(&self, address: &Address, msg: &[u8]) -> Result<Vec<u8>> {
        (self.sign)(address, msg)
    }
}

/// [`ScriptDb`] backed by a closure
pub struct ScriptClosure<F>(pub F);

impl<F> ScriptDb for ScriptClosure<F>
where
    F: Fn(&Address) -> Option<Vec<u8>> + Send + Sync,
{
    fn script(&self, address: &Address) -> Option<Vec<u8>> {
        (self.0)(address)
    }
}

impl ScriptDb for HashMap<Address, Vec<u8>> {
    fn script(&self, address: &Address) -> Option<Vec<u8>> {
        self.get(address).cloned()
    }
}

/// In-memory key store, indexed by the pay-to-pubkey-hash address of each key
#[derive(Debug, Clone)]
pub struct MemoryKeyStore {
    crypto: Arc<Crypto>,
    keys: HashMap<Address, (Vec<u8>, Vec<u8>)>,
}

impl MemoryKeyStore {
    pub fn new(crypto: Arc<Crypto>) -> Self {
        Self { crypto, keys: HashMap::new() }
    }

    /// Import a private key and return its address
    pub fn add_key(&mut self, private_key: &[u8]) -> Result<Address> {
        let public_key = self.crypto.private_key_to_pub_key(private_key)?;
        let address = Address::from_pubkey(&public_key);
        self.keys.insert(address, (private_key.to_vec(), public_key));
        Ok(address)
    }

    /// Generate and import a fresh key
    pub fn generate_key(&mut self) -> Result<Address> {
        let private_key = self.crypto.key_gen()?;
        self.add_key(&private_key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyStore for MemoryKeyStore {
    fn public_key(&self, address: &Address) -> Option<Vec<u8>> {
        self.keys.get(address).map(|(_, public_key)| public_key.clone())
    }

    fn sign(&self, address: &Address, msg: &[u8]) -> Result<Vec<u8>> {
        let (private_key, _) = self.keys.get(address).ok_or_else(|| ScriptError::KeyNotFound(address.to_string()))?;
        self.crypto.sign(private_key, msg)
    }
}

/// A multisig unlock script and how far along it is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedUnlock {
    pub script: Vec<u8>,
    /// Distinct valid signatures in the script
    pub signatures: usize,
    /// Signatures needed to spend
    pub required: usize,
}

impl MergedUnlock {
    pub fn is_complete(&self) -> bool {
        self.signatures >= self.required
    }

    /// The script if it can already be spent
    pub fn into_complete(self) -> Result<Vec<u8>> {
        if self.is_complete() {
            Ok(self.script)
        } else {
            Err(ScriptError::MultisigIncomplete { have: self.signatures, need: self.required })
        }
    }
}

/// Failure to sign one input of a transaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("message {msg_index} input {input_index}: {error}")]
pub struct SignatureError {
    pub msg_index: usize,
    pub input_index: usize,
    pub error: ScriptError,
}

/// Wire signature (DER + hash type byte) for `address` over `subscript`
/// Wire signature (DER plus hash-type byte) by the key behind `address`.
///
/// The key store is not trusted: its output must verify against the public
/// key it reports for `address`.
#[allow(clippy::too_many_arguments)]
fn raw_tx_in_signature(
    crypto: &dyn CryptoBackend,
    tx: &Transaction,
    msg_idx: usize,
    input_idx: usize,
    subscript: &[u8],
    hash_type: SigHashType,
    keys: &dyn KeyStore,
    address: &Address,
) -> Result<Vec<u8>> {
    let data = calc_signature_data(subscript, hash_type, tx, msg_idx, input_idx)?;
    let public_key = keys.public_key(address).ok_or_else(|| ScriptError::KeyNotFound(address.to_string()))?;
    let mut sig = keys.sign(address, &data)?;
    if !crypto.verify(&public_key, &sig, &data) {
        warn!("key store produced a signature for {} that does not verify", address);
        return Err(ScriptError::SignatureInvalid);
    }
    sig.push(hash_type.0);
    Ok(sig)
}

fn single_address(class: ScriptClass, addrs: &[AddressOriginalData]) -> Result<&Address> {
    addrs.first().map(|a| &a.address).ok_or(ScriptError::UnsupportedScript(class))
}

/// Unlock script for a script that is not itself a hash commitment
#[allow(clippy::too_many_arguments)]
fn sign_redeemable(
    crypto: &dyn CryptoBackend,
    tx: &Transaction,
    msg_idx: usize,
    input_idx: usize,
    script: &[u8],
    hash_type: SigHashType,
    keys: &dyn KeyStore,
    previous_script: &[u8],
    redeem_suffix: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let (class, addrs, _) = extract_pk_script_addrs(script)?;
    let mut builder = match class {
        ScriptClass::PubKeyHash => {
            let address = single_address(class, &addrs)?;
            let sig = raw_tx_in_signature(crypto, tx, msg_idx, input_idx, script, hash_type, keys, address)?;
            let public_key = keys.public_key(address).ok_or_else(|| ScriptError::KeyNotFound(address.to_string()))?;
            let mut builder = ScriptBuilder::new();
            builder.add_data(&sig).add_data(&public_key);
            builder
        }
        ScriptClass::PubKey => {
            let address = single_address(class, &addrs)?;
            let sig = raw_tx_in_signature(crypto, tx, msg_idx, input_idx, script, hash_type, keys, address)?;
            let mut builder = ScriptBuilder::new();
            builder.add_data(&sig);
            builder
        }
        ScriptClass::MultiSig => {
            // Bare multisig uses the lock script as subscript; otherwise the
            // redeem script is both subscript and suffix.
            let (lock_script, redeem) = match redeem_suffix {
                Some(redeem) => (&[][..], Some(redeem)),
                None => (script, None),
            };
            let merged = merge_partial_multisig(
                crypto,
                tx,
                msg_idx,
                input_idx,
                lock_script,
                redeem,
                hash_type,
                keys,
                previous_script,
            )?;
            if merged.signatures == 0 {
                let owners: Vec<String> = addrs.iter().map(|a| a.address.to_string()).collect();
                return Err(ScriptError::KeyNotFound(owners.join(",")));
            }
            debug!(
                "multisig input {}:{} has {} of {} signatures",
                msg_idx, input_idx, merged.signatures, merged.required
            );
            return Ok(merged.script);
        }
        ScriptClass::ScriptHash | ScriptClass::ContractHash | ScriptClass::NullData | ScriptClass::NonStandard => {
            return Err(ScriptError::UnsupportedScript(class));
        }
    };

    if let Some(redeem) = redeem_suffix {
        builder.add_data(redeem);
    }
    let script = builder.script()?;

    // Single-signature scripts: the longer (more complete) one wins
    if previous_script.len() > script.len() {
        return Ok(previous_script.to_vec());
    }
    Ok(script)
}

/// Build (or extend) the unlock script for input `input_idx` of payment
/// message `msg_idx`, which spends an output locked by `lock_script`.
///
/// `previous_script` is an unlock script produced earlier for the same input,
/// possibly by another party; it is merged with the new signatures.
#[allow(clippy::too_many_arguments)]
pub fn sign_one_payment_input(
    crypto: &dyn CryptoBackend,
    tx: &Transaction,
    msg_idx: usize,
    input_idx: usize,
    lock_script: &[u8],
    hash_type: SigHashType,
    keys: &dyn KeyStore,
    scripts: &dyn ScriptDb,
    previous_script: &[u8],
) -> Result<Vec<u8>> {
    tx.input(msg_idx, input_idx)?;
    let (class, addrs, _) = extract_pk_script_addrs(lock_script)?;

    match class {
        ScriptClass::ScriptHash | ScriptClass::ContractHash => {
            let address = single_address(class, &addrs)?;
            let redeem = scripts
                .script(address)
                .ok_or_else(|| ScriptError::KeyNotFound(format!("redeem script for {}", address)))?;
            sign_redeemable(
                crypto,
                tx,
                msg_idx,
                input_idx,
                &redeem,
                hash_type,
                keys,
                previous_script,
                Some(&redeem),
            )
        }
        _ => sign_redeemable(crypto, tx, msg_idx, input_idx, lock_script, hash_type, keys, previous_script, None),
    }
}

/// Sign with the keys in `keys` and merge into `previous_unlock_script`.
///
/// For bare multisig pass the lock script and `None`; for script-hash and
/// contract-hash spends pass the redeem script (the lock script is then not
/// consulted). The output always lists signatures in key order, followed by
/// `OP_0` placeholders up to the threshold.
#[allow(clippy::too_many_arguments)]
pub fn merge_partial_multisig(
    crypto: &dyn CryptoBackend,
    tx: &Transaction,
    msg_idx: usize,
    input_idx: usize,
    lock_script: &[u8],
    redeem_script: Option<&[u8]>,
    hash_type: SigHashType,
    keys: &dyn KeyStore,
    previous_unlock_script: &[u8],
) -> Result<MergedUnlock> {
    let subscript = redeem_script.unwrap_or(lock_script);
    let (class, addrs, required) = extract_pk_script_addrs(subscript)?;
    if class != ScriptClass::MultiSig {
        return Err(ScriptError::UnsupportedScript(class));
    }

    let mut candidates: Vec<Vec<u8>> = Vec::new();
    for addr in &addrs {
        if candidates.len() >= required {
            break;
        }
        match raw_tx_in_signature(crypto, tx, msg_idx, input_idx, subscript, hash_type, keys, &addr.address) {
            Ok(sig) => candidates.push(sig),
            Err(ScriptError::KeyNotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }

    let previous_ops = parse_script(previous_unlock_script)?;
    let mut previous_pushes: Vec<&[u8]> = previous_ops
        .iter()
        .filter(|pop| pop.is_push_data() && !pop.data.is_empty())
        .map(|pop| pop.data.as_slice())
        .collect();
    if let Some(redeem) = redeem_script {
        if previous_pushes.last() == Some(&redeem) {
            previous_pushes.pop();
        }
    }
    candidates.extend(previous_pushes.into_iter().map(<[u8]>::to_vec));

    let slots = bind_signatures(crypto, tx, msg_idx, input_idx, subscript, &addrs, &candidates);

    let mut builder = ScriptBuilder::new();
    builder.add_op(OP_FALSE);
    let mut signatures = 0;
    for sig in slots.into_iter().flatten() {
        if signatures == required {
            break;
        }
        builder.add_data(sig);
        signatures += 1;
    }
    for _ in signatures..required {
        builder.add_op(OP_0);
    }
    if let Some(redeem) = redeem_script {
        builder.add_data(redeem);
    }

    Ok(MergedUnlock { script: builder.script()?, signatures, required })
}

/// For each key, in order, the first candidate signature that verifies
/// against it. Each candidate is used at most once.
fn bind_signatures<'c>(
    crypto: &dyn CryptoBackend,
    tx: &Transaction,
    msg_idx: usize,
    input_idx: usize,
    subscript: &[u8],
    addrs: &[AddressOriginalData],
    candidates: &'c [Vec<u8>],
) -> Vec<Option<&'c [u8]>> {
    let mut sig_data: HashMap<u8, Option<Vec<u8>>> = HashMap::new();
    let mut used = vec![false; candidates.len()];
    let mut slots = Vec::with_capacity(addrs.len());

    for addr in addrs {
        let mut slot = None;
        for (i, candidate) in candidates.iter().enumerate() {
            if used[i] {
                continue;
            }
            let (der, hash_type) = match split_signature(candidate) {
                Some(parts) => parts,
                None => continue,
            };
            let data = sig_data
                .entry(hash_type.0)
                .or_insert_with(|| calc_signature_data(subscript, hash_type, tx, msg_idx, input_idx).ok());
            if let Some(data) = data {
                if crypto.verify(&addr.original, der, data) {
                    used[i] = true;
                    slot = Some(candidate.as_slice());
                    break;
                }
            }
        }
        slots.push(slot);
    }

    let dropped = used.iter().filter(|u| !**u).count();
    if dropped > 0 {
        debug!("discarded {} signatures matching no key of input {}:{}", dropped, msg_idx, input_idx);
    }
    slots
}

/// Sign every payment input that has no unlock script yet.
///
/// Inputs signed with SIGHASH_SINGLE that have no output at their index are
/// left unsigned. Every input is attempted; failures are collected.
pub fn sign_tx_all_payment_inputs(
    crypto: &dyn CryptoBackend,
    tx: &mut Transaction,
    hash_type: SigHashType,
    utxos: &dyn UtxoView,
    keys: &dyn KeyStore,
    scripts: &dyn ScriptDb,
) -> std::result::Result<(), Vec<SignatureError>> {
    let mut errors = Vec::new();

    for msg_idx in 0..tx.messages.len() {
        let (outpoints, num_outputs) = match tx.messages[msg_idx].as_payment() {
            Some(payment) => (
                payment
                    .inputs
                    .iter()
                    .map(|input| (input.previous_out_point, input.signature_script.is_empty()))
                    .collect::<Vec<_>>(),
                payment.outputs.len(),
            ),
            None => continue,
        };

        for (input_idx, (outpoint, unsigned)) in outpoints.into_iter().enumerate() {
            if !unsigned {
                continue;
            }
            if hash_type.is_single() && input_idx >= num_outputs {
                debug!("skipping SIGHASH_SINGLE input {}:{} without matching output", msg_idx, input_idx);
                continue;
            }

            let result = utxos
                .get_utxo(&outpoint)
                .ok_or_else(|| ScriptError::UtxoNotFound(outpoint.to_string()))
                .and_then(|utxo| {
                    sign_one_payment_input(
                        crypto,
                        tx,
                        msg_idx,
                        input_idx,
                        &utxo.pk_script,
                        hash_type,
                        keys,
                        scripts,
                        &[],
                    )
                });

            match result.and_then(|script| {
                tx.payment_mut(msg_idx)?.inputs[input_idx].signature_script = script;
                Ok(())
            }) {
                Ok(()) => {}
                Err(error) => {
                    warn!("failed to sign input {}:{}: {}", msg_idx, input_idx, error);
                    errors.push(SignatureError { msg_index: msg_idx, input_index: input_idx, error });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Addresses of the keys whose signatures appear in a script-hash or
/// contract-hash multisig unlock script (`OP_0 <sig>... <redeem>`)
pub fn script_signers(
    crypto: &dyn CryptoBackend,
    tx: &Transaction,
    msg_idx: usize,
    input_idx: usize,
) -> Result<Vec<Address>> {
    let unlock = &tx.input(msg_idx, input_idx)?.signature_script;
    let ops = parse_script(unlock)?;
    let (redeem, sigs) = ops
        .split_last()
        .ok_or_else(|| ScriptError::Parse("empty unlock script".to_string()))?;

    let (pubkeys, _) = multisig_keys(&redeem.data)?;
    let addrs: Vec<AddressOriginalData> = pubkeys
        .into_iter()
        .map(|pk| AddressOriginalData { address: Address::from_pubkey(&pk), original: pk })
        .collect();
    let candidates: Vec<Vec<u8>> = sigs
        .iter()
        .filter(|pop| pop.is_push_data() && !pop.data.is_empty())
        .map(|pop| pop.data.clone())
        .collect();

    let slots = bind_signatures(crypto, tx, msg_idx, input_idx, &redeem.data, &addrs, &candidates);
    Ok(addrs
        .iter()
        .zip(slots)
        .filter(|(_, slot)| slot.is_some())
        .map(|(addr, _)| addr.address)
        .collect())
}

/// Contract unlock script from jury signatures: `OP_0 <sig>... <redeem>`.
///
/// Signatures are wire signatures (DER plus hash type byte) and must already
/// be in the redeem script's key order.
pub fn merge_contract_unlock_script(signatures: &[Vec<u8>], redeem_script: &[u8]) -> Result<Vec<u8>> {
    let mut builder = ScriptBuilder::new();
    builder.add_op(OP_FALSE);
    for sig in signatures {
        builder.add_data(sig);
    }
    builder.add_data(redeem_script);
    builder.script()
}
