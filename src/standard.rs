//! Standard lock script templates
//!
//! Classification recognizes the lock script shapes the signer knows how to
//! satisfy and recovers the addresses they pay to. The generators build the
//! same shapes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::{hash160, Address, AddressOriginalData, AddressType};
use crate::constants::*;
use crate::error::{Result, ScriptError};
use crate::opcodes::*;
use crate::script::{is_push_only, parse_script, ParsedOpcode, ScriptBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptClass {
    NonStandard,
    PubKey,
    PubKeyHash,
    ScriptHash,
    ContractHash,
    MultiSig,
    NullData,
}

impl fmt::Display for ScriptClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptClass::NonStandard => "nonstandard",
            ScriptClass::PubKey => "pubkey",
            ScriptClass::PubKeyHash => "pubkeyhash",
            ScriptClass::ScriptHash => "scripthash",
            ScriptClass::ContractHash => "contracthash",
            ScriptClass::MultiSig => "multisig",
            ScriptClass::NullData => "nulldata",
        };
        f.write_str(name)
    }
}

/// Does `data` look like a serialized public key (compressed or not)?
pub fn is_pubkey(data: &[u8]) -> bool {
    match data.len() {
        COMPRESSED_PUBKEY_SIZE => data[0] == 0x02 || data[0] == 0x03,
        UNCOMPRESSED_PUBKEY_SIZE => data[0] == 0x04,
        _ => false,
    }
}

fn is_pubkey_hash(ops: &[ParsedOpcode]) -> bool {
    ops.len() == 5
        && ops[0].opcode == OP_DUP
        && ops[1].opcode == OP_HASH160
        && ops[2].opcode == OP_DATA_20
        && ops[3].opcode == OP_EQUALVERIFY
        && ops[4].opcode == OP_CHECKSIG
}

fn is_script_hash(ops: &[ParsedOpcode]) -> bool {
    ops.len() == 3 && ops[0].opcode == OP_HASH160 && ops[1].opcode == OP_DATA_20 && ops[2].opcode == OP_EQUAL
}

fn is_contract_hash(ops: &[ParsedOpcode]) -> bool {
    ops.len() == 2 && ops[0].opcode == OP_DATA_20 && ops[1].opcode == OP_JURY_REDEEM_EQUAL
}

fn is_multisig(ops: &[ParsedOpcode]) -> bool {
    let len = ops.len();
    if len < 4 {
        return false;
    }
    if !is_small_int(ops[0].opcode) || ops[0].opcode == OP_0 {
        return false;
    }
    if !is_small_int(ops[len - 2].opcode) || ops[len - 1].opcode != OP_CHECKMULTISIG {
        return false;
    }
    let m = small_int_value(ops[0].opcode);
    let n = small_int_value(ops[len - 2].opcode);
    let keys = &ops[1..len - 2];
    if keys.len() != n || m > n {
        return false;
    }
    keys.iter().all(|pop| is_pubkey(&pop.data))
}

fn is_pubkey_script(ops: &[ParsedOpcode]) -> bool {
    ops.len() == 2 && is_pubkey(&ops[0].data) && ops[1].opcode == OP_CHECKSIG
}

fn is_null_data(ops: &[ParsedOpcode]) -> bool {
    !ops.is_empty() && ops[0].opcode == OP_RETURN && is_push_only(&ops[1..])
}

/// Classify already-parsed opcodes
pub fn type_of_script(ops: &[ParsedOpcode]) -> ScriptClass {
    if is_pubkey_hash(ops) {
        ScriptClass::PubKeyHash
    } else if is_script_hash(ops) {
        ScriptClass::ScriptHash
    } else if is_contract_hash(ops) {
        ScriptClass::ContractHash
    } else if is_multisig(ops) {
        ScriptClass::MultiSig
    } else if is_pubkey_script(ops) {
        ScriptClass::PubKey
    } else if is_null_data(ops) {
        ScriptClass::NullData
    } else {
        ScriptClass::NonStandard
    }
}

/// Classify a lock script
pub fn get_script_class(script: &[u8]) -> Result<ScriptClass> {
    Ok(type_of_script(&parse_script(script)?))
}

/// Classify a lock script and recover the addresses it pays to, along with
/// the number of signatures needed to spend it.
pub fn extract_pk_script_addrs(script: &[u8]) -> Result<(ScriptClass, Vec<AddressOriginalData>, usize)> {
    let ops = parse_script(script)?;
    let class = type_of_script(&ops);

    let hash_addr = |kind: AddressType, data: &[u8]| -> Result<AddressOriginalData> {
        Ok(AddressOriginalData { address: Address::from_hash_slice(kind, data)?, original: data.to_vec() })
    };
    let key_addr = |data: &[u8]| AddressOriginalData { address: Address::from_pubkey(data), original: data.to_vec() };

    let result = match class {
        ScriptClass::PubKeyHash => (class, vec![hash_addr(AddressType::PublicKeyHash, &ops[2].data)?], 1),
        ScriptClass::ScriptHash => (class, vec![hash_addr(AddressType::ScriptHash, &ops[1].data)?], 1),
        ScriptClass::ContractHash => (class, vec![hash_addr(AddressType::ContractHash, &ops[0].data)?], 1),
        ScriptClass::PubKey => (class, vec![key_addr(&ops[0].data)], 1),
        ScriptClass::MultiSig => {
            let m = small_int_value(ops[0].opcode);
            let addrs = ops[1..ops.len() - 2].iter().map(|pop| key_addr(&pop.data)).collect();
            (class, addrs, m)
        }
        ScriptClass::NullData | ScriptClass::NonStandard => (class, Vec::new(), 0),
    };
    Ok(result)
}

/// The one address a lock script pays to
pub fn address_from_lock_script(script: &[u8]) -> Result<Address> {
    let (class, addrs, _) = extract_pk_script_addrs(script)?;
    match addrs.as_slice() {
        [] => Err(ScriptError::UnsupportedScript(class)),
        [single] => Ok(single.address),
        _ => Err(ScriptError::ClassificationAmbiguous),
    }
}

/// Public keys and threshold of a multisig (or single-key) redeem script
pub fn multisig_keys(script: &[u8]) -> Result<(Vec<Vec<u8>>, usize)> {
    let ops = parse_script(script)?;
    match type_of_script(&ops) {
        ScriptClass::MultiSig => {
            let keys = ops[1..ops.len() - 2].iter().map(|pop| pop.data.clone()).collect();
            Ok((keys, small_int_value(ops[0].opcode)))
        }
        ScriptClass::PubKey => Ok((vec![ops[0].data.clone()], 1)),
        class => Err(ScriptError::UnsupportedScript(class)),
    }
}

pub fn p2pkh_lock_script(hash: &[u8; HASH160_SIZE]) -> Result<Vec<u8>> {
    ScriptBuilder::new()
        .add_op(OP_DUP)
        .add_op(OP_HASH160)
        .add_data(hash)
        .add_op(OP_EQUALVERIFY)
        .add_op(OP_CHECKSIG)
        .script()
}

pub fn p2sh_lock_script(hash: &[u8; HASH160_SIZE]) -> Result<Vec<u8>> {
    ScriptBuilder::new().add_op(OP_HASH160).add_data(hash).add_op(OP_EQUAL).script()
}

/// Contract (jury) lock script: `<hash160(redeem)> OP_JURY_REDEEM_EQUAL`
pub fn p2ch_lock_script(hash: &[u8; HASH160_SIZE]) -> Result<Vec<u8>> {
    ScriptBuilder::new().add_data(hash).add_op(OP_JURY_REDEEM_EQUAL).script()
}

pub fn lock_script_for_address(address: &Address) -> Result<Vec<u8>> {
    match address.kind {
        AddressType::PublicKeyHash => p2pkh_lock_script(&address.hash),
        AddressType::ScriptHash => p2sh_lock_script(&address.hash),
        AddressType::ContractHash => p2ch_lock_script(&address.hash),
    }
}

/// Build an m-of-n redeem script.
///
/// Keys are ordered by descending byte value so every participant derives
/// the same script (and address) from the same key set. A 1-of-1 collapses
/// to `<pubkey> OP_CHECKSIG`.
///
/// The script must fit in one pushed element, otherwise a script-hash or
/// contract-hash output paying to it could never be unlocked. That caps
/// compressed keys at 15 and uncompressed keys at 7.
pub fn multisig_redeem_script(required: usize, pubkeys: &[Vec<u8>]) -> Result<Vec<u8>> {
    let n = pubkeys.len();
    if required == 0 || required > n || n > MAX_STANDARD_MULTISIG_KEYS {
        return Err(ScriptError::Parse(format!("invalid multisig parameters: {} of {}", required, n)));
    }
    if let Some(bad) = pubkeys.iter().find(|pk| !is_pubkey(pk)) {
        return Err(ScriptError::Parse(format!("invalid public key {}", hex::encode(bad))));
    }

    if n == 1 {
        return ScriptBuilder::new().add_data(&pubkeys[0]).add_op(OP_CHECKSIG).script();
    }

    let mut sorted = pubkeys.to_vec();
    sorted.sort_by(|a, b| b.cmp(a));

    let mut builder = ScriptBuilder::new();
    builder.add_int64(required as i64);
    for pk in &sorted {
        builder.add_data(pk);
    }
    builder.add_int64(n as i64).add_op(OP_CHECKMULTISIG);
    let script = builder.script()?;
    if script.len() > MAX_SCRIPT_ELEMENT_SIZE {
        return Err(ScriptError::ScriptTooLong(script.len()));
    }
    Ok(script)
}

/// Address paying to the hash of `redeem` with the given kind
pub fn redeem_script_address(kind: AddressType, redeem: &[u8]) -> Address {
    Address::new(kind, hash160(redeem))
}
