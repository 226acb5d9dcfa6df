//! Signature hash calculation
//!
//! Builds the exact byte string an input signature commits to. The hash
//! type selects which outputs and inputs are covered:
//!
//! - ALL: every output
//! - NONE: no outputs
//! - SINGLE: only the output sharing the input's index
//! - ANYONECANPAY (flag): only this input
//!
//! The result is handed to the crypto backend, which digests it once.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::CryptoBackend;
use crate::error::{Result, ScriptError};
use crate::opcodes::OP_CODESEPARATOR;
use crate::script::{parse_script, remove_opcode, unparse_script};
use crate::serialization::serialize_transaction;
use crate::types::{Asset, Message, Transaction};

pub const SIGHASH_ALL: u8 = 0x01;
pub const SIGHASH_NONE: u8 = 0x02;
pub const SIGHASH_SINGLE: u8 = 0x03;
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;

const SIGHASH_MASK: u8 = 0x1f;

/// Hash type byte appended to every signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SigHashType(pub u8);

impl SigHashType {
    pub const ALL: SigHashType = SigHashType(SIGHASH_ALL);
    pub const NONE: SigHashType = SigHashType(SIGHASH_NONE);
    pub const SINGLE: SigHashType = SigHashType(SIGHASH_SINGLE);
    pub const ALL_ANYONECANPAY: SigHashType = SigHashType(SIGHASH_ALL | SIGHASH_ANYONECANPAY);
    pub const NONE_ANYONECANPAY: SigHashType = SigHashType(SIGHASH_NONE | SIGHASH_ANYONECANPAY);
    pub const SINGLE_ANYONECANPAY: SigHashType = SigHashType(SIGHASH_SINGLE | SIGHASH_ANYONECANPAY);

    /// Base type with the ANYONECANPAY flag stripped
    pub fn base(self) -> u8 {
        self.0 & SIGHASH_MASK
    }

    pub fn anyone_can_pay(self) -> bool {
        self.0 & SIGHASH_ANYONECANPAY != 0
    }

    pub fn is_none(self) -> bool {
        self.base() == SIGHASH_NONE
    }

    pub fn is_single(self) -> bool {
        self.base() == SIGHASH_SINGLE
    }
}

impl Default for SigHashType {
    fn default() -> Self {
        SigHashType::ALL
    }
}

impl fmt::Display for SigHashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.base() {
            SIGHASH_NONE => "NONE",
            SIGHASH_SINGLE => "SINGLE",
            _ => "ALL",
        };
        if self.anyone_can_pay() {
            write!(f, "{}|ANYONECANPAY", base)
        } else {
            f.write_str(base)
        }
    }
}

/// Split a wire signature into its DER body and trailing hash type
pub fn split_signature(sig: &[u8]) -> Option<(&[u8], SigHashType)> {
    let (hash_type, der) = sig.split_last()?;
    Some((der, SigHashType(*hash_type)))
}

/// Bytes committed to by the signature on input `input_idx` of payment
/// message `msg_idx`.
///
/// `subscript` is the script being satisfied: the referenced lock script,
/// or the redeem script for script-hash and contract-hash outputs.
pub fn calc_signature_data(
    subscript: &[u8],
    hash_type: SigHashType,
    tx: &Transaction,
    msg_idx: usize,
    input_idx: usize,
) -> Result<Vec<u8>> {
    let payment = tx.payment(msg_idx)?;
    if input_idx >= payment.inputs.len() {
        return Err(ScriptError::IndexOutOfRange(format!(
            "input {} of message {} ({} inputs)",
            input_idx,
            msg_idx,
            payment.inputs.len()
        )));
    }
    if hash_type.is_single() && input_idx >= payment.outputs.len() {
        return Err(ScriptError::SighashSingleNoOutput);
    }

    let subscript = unparse_script(&remove_opcode(&parse_script(subscript)?, OP_CODESEPARATOR))?;

    let mut tx_copy = tx.clone();
    for message in tx_copy.messages.iter_mut() {
        if let Message::Payment(p) = message {
            for input in p.inputs.iter_mut() {
                input.signature_script.clear();
            }
        }
    }

    let payment = tx_copy.payment_mut(msg_idx)?;
    payment.inputs[input_idx].signature_script = subscript;

    match hash_type.base() {
        SIGHASH_NONE => payment.outputs.clear(),
        SIGHASH_SINGLE => {
            payment.outputs.truncate(input_idx + 1);
            for output in payment.outputs.iter_mut().take(input_idx) {
                output.value = 0;
                output.pk_script.clear();
                output.asset = Asset::default();
            }
        }
        _ => {}
    }

    if hash_type.anyone_can_pay() {
        let this_input = payment.inputs.swap_remove(input_idx);
        payment.inputs = vec![this_input];
    }

    let mut data = serialize_transaction(&tx_copy);
    data.extend_from_slice(&(hash_type.0 as u32).to_le_bytes());
    Ok(data)
}

/// Backend digest of [`calc_signature_data`].
///
/// This is the value the secp256k1 and P-256 backends sign internally, so an
/// external ECDSA signer over the same curve can sign it as a prehash. SM2
/// signs `SM3(Z || data)`, where `Z` binds the signer's identity and key, so
/// for SM2 the result only identifies the preimage and cannot be signed
/// directly. Signing inside this crate always goes through
/// [`CryptoBackend::sign`] with the full preimage.
pub fn calc_signature_hash(
    crypto: &dyn CryptoBackend,
    subscript: &[u8],
    hash_type: SigHashType,
    tx: &Transaction,
    msg_idx: usize,
    input_idx: usize,
) -> Result<Vec<u8>> {
    let data = calc_signature_data(subscript, hash_type, tx, msg_idx, input_idx)?;
    Ok(crypto.hash(&data))
}
