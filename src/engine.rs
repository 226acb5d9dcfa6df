//! Script execution engine
//!
//! Validating an input runs a small stack machine over:
//!
//! 1. the input's unlock script, on an empty stack
//! 2. the referenced output's lock script, on the resulting stack
//! 3. for script-hash and contract-hash outputs only: the redeem script
//!    revealed as the last push of the unlock script, on the stack left by
//!    step 1 minus that push
//!
//! The input is valid when exactly one element remains and it is true.
//! Every failure is reported as an [`ExecutionFailure`]; malformed or hostile
//! scripts never panic the engine.

use bitcoin_hashes::{sha256d, Hash as BitcoinHash};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::address::{hash160, Address, AddressType};
use crate::constants::*;
use crate::crypto::CryptoBackend;
use crate::error::{ExecutionFailure, Result, ScriptError};
use crate::opcodes::*;
use crate::script::{
    decode_script_num, encode_script_num, is_push_only, parse_script, unparse_script, ParsedOpcode,
};
use crate::sigcache::SigCache;
use crate::sighash::{calc_signature_data, split_signature, SIGHASH_ALL, SIGHASH_NONE, SIGHASH_SINGLE};
use crate::sign::ScriptDb;
use crate::standard::{type_of_script, ScriptClass};
use crate::types::{Hash, Transaction, UtxoView};

type ExecResult<T> = std::result::Result<T, ExecutionFailure>;

/// Optional collaborators for validation
#[derive(Clone, Copy, Default)]
pub struct ValidateOptions<'a> {
    /// Skip re-verifying signatures that already verified
    pub sig_cache: Option<&'a SigCache>,
    /// Registered contract redeem scripts; when present, a contract-hash
    /// spend must reveal exactly the registered script
    pub script_db: Option<&'a dyn ScriptDb>,
}

impl<'a> ValidateOptions<'a> {
    pub fn with_sig_cache(mut self, cache: &'a SigCache) -> Self {
        self.sig_cache = Some(cache);
        self
    }

    pub fn with_script_db(mut self, db: &'a dyn ScriptDb) -> Self {
        self.script_db = Some(db);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cond {
    True,
    False,
    Skip,
}

/// Truthiness of a stack element: any non-zero byte, except negative zero
pub fn cast_to_bool(value: &[u8]) -> bool {
    for (i, byte) in value.iter().enumerate() {
        if *byte != 0 {
            // 0x80 in the last position is negative zero
            if i == value.len() - 1 && *byte == 0x80 {
                return false;
            }
            return true;
        }
    }
    false
}

fn bool_bytes(value: bool) -> Vec<u8> {
    if value {
        vec![1]
    } else {
        Vec::new()
    }
}

struct Engine<'a> {
    crypto: &'a dyn CryptoBackend,
    tx: &'a Transaction,
    msg_idx: usize,
    input_idx: usize,
    sig_cache: Option<&'a SigCache>,
    dstack: Vec<Vec<u8>>,
    astack: Vec<Vec<u8>>,
    cond_stack: Vec<Cond>,
}

impl<'a> Engine<'a> {
    fn new(
        crypto: &'a dyn CryptoBackend,
        tx: &'a Transaction,
        msg_idx: usize,
        input_idx: usize,
        sig_cache: Option<&'a SigCache>,
    ) -> Self {
        Self {
            crypto,
            tx,
            msg_idx,
            input_idx,
            sig_cache,
            dstack: Vec::new(),
            astack: Vec::new(),
            cond_stack: Vec::new(),
        }
    }

    fn is_executing(&self) -> bool {
        self.cond_stack.iter().all(|c| *c == Cond::True)
    }

    fn require(&self, n: usize) -> ExecResult<()> {
        if self.dstack.len() < n {
            return Err(ExecutionFailure::StackUnderflow);
        }
        Ok(())
    }

    fn pop(&mut self) -> ExecResult<Vec<u8>> {
        self.dstack.pop().ok_or(ExecutionFailure::StackUnderflow)
    }

    fn pop_bool(&mut self) -> ExecResult<bool> {
        Ok(cast_to_bool(&self.pop()?))
    }

    fn pop_int(&mut self) -> ExecResult<i64> {
        let bytes = self.pop()?;
        decode_script_num(&bytes, 4)
            .ok_or_else(|| ExecutionFailure::Malformed(format!("numeric operand of {} bytes", bytes.len())))
    }

    fn peek(&self, depth: usize) -> ExecResult<&Vec<u8>> {
        self.require(depth + 1)?;
        Ok(&self.dstack[self.dstack.len() - 1 - depth])
    }

    /// Run one script to completion on the current stacks
    fn execute(&mut self, ops: &[ParsedOpcode]) -> ExecResult<()> {
        self.cond_stack.clear();
        self.astack.clear();
        let mut num_ops = 0usize;
        let mut code_start = 0usize;

        for (idx, pop) in ops.iter().enumerate() {
            let opcode = pop.opcode;

            // Checked regardless of branch state
            if is_disabled(opcode) {
                return Err(ExecutionFailure::DisabledOpcode(opcode));
            }
            if matches!(opcode, OP_VERIF | OP_VERNOTIF) {
                return Err(ExecutionFailure::InvalidOpcode(opcode));
            }
            if pop.counts_as_op() {
                num_ops += 1;
                if num_ops > MAX_OPS_PER_SCRIPT {
                    return Err(ExecutionFailure::OpCountExceeded);
                }
            }
            if pop.data.len() > MAX_SCRIPT_ELEMENT_SIZE {
                return Err(ExecutionFailure::PushSize(pop.data.len()));
            }

            if !self.is_executing() && !is_conditional(opcode) {
                continue;
            }

            match opcode {
                OP_0..=OP_PUSHDATA4 => self.dstack.push(pop.data.clone()),
                OP_1NEGATE => self.dstack.push(encode_script_num(-1)),
                OP_1..=OP_16 => self.dstack.push(vec![opcode - (OP_1 - 1)]),

                OP_NOP | OP_NOP1..=OP_NOP10 => {}

                OP_IF | OP_NOTIF => {
                    let cond = if self.is_executing() {
                        let mut value = self.pop_bool()?;
                        if opcode == OP_NOTIF {
                            value = !value;
                        }
                        if value {
                            Cond::True
                        } else {
                            Cond::False
                        }
                    } else {
                        Cond::Skip
                    };
                    self.cond_stack.push(cond);
                }
                OP_ELSE => {
                    let last = self.cond_stack.last_mut().ok_or(ExecutionFailure::UnbalancedConditional)?;
                    *last = match *last {
                        Cond::True => Cond::False,
                        Cond::False => Cond::True,
                        Cond::Skip => Cond::Skip,
                    };
                }
                OP_ENDIF => {
                    self.cond_stack.pop().ok_or(ExecutionFailure::UnbalancedConditional)?;
                }
                OP_VERIFY => {
                    if !self.pop_bool()? {
                        return Err(ExecutionFailure::VerifyFailed);
                    }
                }
                OP_RETURN => return Err(ExecutionFailure::OpReturn),

                OP_TOALTSTACK => {
                    let item = self.pop()?;
                    self.astack.push(item);
                }
                OP_FROMALTSTACK => {
                    let item = self.astack.pop().ok_or(ExecutionFailure::StackUnderflow)?;
                    self.dstack.push(item);
                }
                OP_2DROP => {
                    self.require(2)?;
                    self.dstack.truncate(self.dstack.len() - 2);
                }
                OP_2DUP => {
                    self.require(2)?;
                    let n = self.dstack.len();
                    self.dstack.extend_from_within(n - 2..);
                }
                OP_3DUP => {
                    self.require(3)?;
                    let n = self.dstack.len();
                    self.dstack.extend_from_within(n - 3..);
                }
                OP_2OVER => {
                    self.require(4)?;
                    let n = self.dstack.len();
                    self.dstack.extend_from_within(n - 4..n - 2);
                }
                OP_2ROT => {
                    self.require(6)?;
                    let n = self.dstack.len();
                    self.dstack[n - 6..].rotate_left(2);
                }
                OP_2SWAP => {
                    self.require(4)?;
                    let n = self.dstack.len();
                    self.dstack[n - 4..].rotate_left(2);
                }
                OP_IFDUP => {
                    let top = self.peek(0)?;
                    if cast_to_bool(top) {
                        let copy = top.clone();
                        self.dstack.push(copy);
                    }
                }
                OP_DEPTH => {
                    let depth = self.dstack.len() as i64;
                    self.dstack.push(encode_script_num(depth));
                }
                OP_DROP => {
                    self.pop()?;
                }
                OP_DUP => {
                    let top = self.peek(0)?.clone();
                    self.dstack.push(top);
                }
                OP_NIP => {
                    self.require(2)?;
                    let n = self.dstack.len();
                    self.dstack.remove(n - 2);
                }
                OP_OVER => {
                    let second = self.peek(1)?.clone();
                    self.dstack.push(second);
                }
                OP_PICK | OP_ROLL => {
                    let depth = self.pop_int()?;
                    if depth < 0 || depth as usize >= self.dstack.len() {
                        return Err(ExecutionFailure::InvalidStackIndex);
                    }
                    let pos = self.dstack.len() - 1 - depth as usize;
                    let item = if opcode == OP_PICK {
                        self.dstack[pos].clone()
                    } else {
                        self.dstack.remove(pos)
                    };
                    self.dstack.push(item);
                }
                OP_ROT => {
                    self.require(3)?;
                    let n = self.dstack.len();
                    self.dstack[n - 3..].rotate_left(1);
                }
                OP_SWAP => {
                    self.require(2)?;
                    let n = self.dstack.len();
                    self.dstack.swap(n - 1, n - 2);
                }
                OP_TUCK => {
                    self.require(2)?;
                    let n = self.dstack.len();
                    let top = self.dstack[n - 1].clone();
                    self.dstack.insert(n - 2, top);
                }
                OP_SIZE => {
                    let len = self.peek(0)?.len() as i64;
                    self.dstack.push(encode_script_num(len));
                }

                OP_EQUAL | OP_EQUALVERIFY => {
                    let a = self.pop()?;
                    let b = self.pop()?;
                    if opcode == OP_EQUALVERIFY {
                        if a != b {
                            return Err(ExecutionFailure::EqualVerify);
                        }
                    } else {
                        self.dstack.push(bool_bytes(a == b));
                    }
                }

                OP_RIPEMD160 => {
                    let item = self.pop()?;
                    self.dstack.push(Ripemd160::digest(&item).to_vec());
                }
                OP_SHA256 => {
                    let item = self.pop()?;
                    self.dstack.push(Sha256::digest(&item).to_vec());
                }
                OP_HASH160 => {
                    let item = self.pop()?;
                    self.dstack.push(hash160(&item).to_vec());
                }
                OP_HASH256 => {
                    let item = self.pop()?;
                    self.dstack.push(sha256d::Hash::hash(&item).into_inner().to_vec());
                }
                OP_JURY_REDEEM_EQUAL => {
                    let expected = self.pop()?;
                    let redeem = self.pop()?;
                    self.dstack.push(bool_bytes(hash160(&redeem).as_slice() == expected.as_slice()));
                }

                OP_CODESEPARATOR => code_start = idx + 1,

                OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                    let pub_key = self.pop()?;
                    let sig = self.pop()?;
                    let subscript = subscript_bytes(&ops[code_start..])?;
                    let valid = self.check_sig(&subscript, &sig, &pub_key);
                    if opcode == OP_CHECKSIGVERIFY {
                        if !valid {
                            return Err(ExecutionFailure::CheckSigVerify);
                        }
                    } else {
                        self.dstack.push(bool_bytes(valid));
                    }
                }
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                    let subscript = subscript_bytes(&ops[code_start..])?;
                    let valid = self.check_multisig(&subscript, &mut num_ops)?;
                    if opcode == OP_CHECKMULTISIGVERIFY {
                        if !valid {
                            return Err(ExecutionFailure::CheckMultiSigVerify);
                        }
                    } else {
                        self.dstack.push(bool_bytes(valid));
                    }
                }

                _ => return Err(ExecutionFailure::InvalidOpcode(opcode)),
            }

            if self.dstack.len() + self.astack.len() > MAX_STACK_SIZE {
                return Err(ExecutionFailure::StackOverflow);
            }
        }

        if !self.cond_stack.is_empty() {
            return Err(ExecutionFailure::UnbalancedConditional);
        }
        Ok(())
    }

    /// Stack: `<dummy> <sig>*m <m> <pubkey>*n <n>`
    fn check_multisig(&mut self, subscript: &[u8], num_ops: &mut usize) -> ExecResult<bool> {
        let num_keys = self.pop_int()?;
        if num_keys < 0 || num_keys as usize > MAX_PUBKEYS_PER_MULTISIG {
            return Err(ExecutionFailure::PubKeyCount);
        }
        let num_keys = num_keys as usize;
        *num_ops += num_keys;
        if *num_ops > MAX_OPS_PER_SCRIPT {
            return Err(ExecutionFailure::OpCountExceeded);
        }
        self.require(num_keys)?;
        let keys = self.dstack.split_off(self.dstack.len() - num_keys);

        let num_sigs = self.pop_int()?;
        if num_sigs < 0 || num_sigs as usize > num_keys {
            return Err(ExecutionFailure::SigCount);
        }
        let num_sigs = num_sigs as usize;
        self.require(num_sigs)?;
        let sigs = self.dstack.split_off(self.dstack.len() - num_sigs);

        let dummy = self.pop()?;
        if !dummy.is_empty() {
            return Err(ExecutionFailure::NullDummy);
        }

        // Signatures must appear in the same order as their keys
        let mut key_idx = 0;
        let mut sig_idx = 0;
        while sig_idx < sigs.len() {
            if sigs.len() - sig_idx > keys.len() - key_idx {
                return Ok(false);
            }
            let sig = &sigs[sig_idx];
            let key = &keys[key_idx];
            key_idx += 1;
            if sig.is_empty() {
                continue;
            }
            if self.check_sig(subscript, sig, key) {
                sig_idx += 1;
            }
        }
        Ok(true)
    }

    fn check_sig(&self, subscript: &[u8], sig: &[u8], pub_key: &[u8]) -> bool {
        let (der, hash_type) = match split_signature(sig) {
            Some(parts) => parts,
            None => return false,
        };
        if !matches!(hash_type.base(), SIGHASH_ALL | SIGHASH_NONE | SIGHASH_SINGLE) {
            return false;
        }
        let data = match calc_signature_data(subscript, hash_type, self.tx, self.msg_idx, self.input_idx) {
            Ok(data) => data,
            Err(e) => {
                trace!("no signature data for input {}: {}", self.input_idx, e);
                return false;
            }
        };

        let cache_key: Hash = Sha256::digest(&data).into();
        if let Some(cache) = self.sig_cache {
            if cache.exists(&cache_key, sig, pub_key) {
                return true;
            }
        }

        let valid = self.crypto.verify(pub_key, der, &data);
        if valid {
            if let Some(cache) = self.sig_cache {
                cache.add(cache_key, sig, pub_key);
            }
        }
        valid
    }

    fn top_is_true(&self) -> bool {
        self.dstack.last().map_or(false, |top| cast_to_bool(top))
    }
}

fn subscript_bytes(ops: &[ParsedOpcode]) -> ExecResult<Vec<u8>> {
    unparse_script(ops).map_err(|e| ExecutionFailure::Malformed(e.to_string()))
}

fn parse_for_execution(script: &[u8]) -> ExecResult<Vec<ParsedOpcode>> {
    if script.len() > MAX_SCRIPT_SIZE {
        return Err(ExecutionFailure::ScriptTooLong(script.len()));
    }
    parse_script(script).map_err(|e| ExecutionFailure::Malformed(e.to_string()))
}

fn verify_input(
    crypto: &dyn CryptoBackend,
    unlock_script: &[u8],
    lock_script: &[u8],
    tx: &Transaction,
    msg_idx: usize,
    input_idx: usize,
    options: ValidateOptions<'_>,
) -> ExecResult<()> {
    let unlock_ops = parse_for_execution(unlock_script)?;
    let lock_ops = parse_for_execution(lock_script)?;

    let class = type_of_script(&lock_ops);
    let pays_to_hash = matches!(class, ScriptClass::ScriptHash | ScriptClass::ContractHash);
    if pays_to_hash && !is_push_only(&unlock_ops) {
        return Err(ExecutionFailure::NotPushOnly);
    }

    let mut vm = Engine::new(crypto, tx, msg_idx, input_idx, options.sig_cache);
    vm.execute(&unlock_ops)?;
    let saved_stack = if pays_to_hash { vm.dstack.clone() } else { Vec::new() };
    vm.execute(&lock_ops)?;

    if pays_to_hash {
        if !vm.top_is_true() {
            return Err(ExecutionFailure::EvalFalse);
        }
        let mut stack = saved_stack;
        let redeem_script = stack.pop().ok_or(ExecutionFailure::StackUnderflow)?;

        if class == ScriptClass::ContractHash {
            if let Some(db) = options.script_db {
                let hash = &lock_ops[0].data;
                let registered = Address::from_hash_slice(AddressType::ContractHash, hash)
                    .ok()
                    .and_then(|addr| db.script(&addr));
                if registered.as_deref() != Some(redeem_script.as_slice()) {
                    return Err(ExecutionFailure::RedeemScriptMismatch);
                }
            }
        }

        let redeem_ops = parse_for_execution(&redeem_script)?;
        vm.dstack = stack;
        vm.execute(&redeem_ops)?;
    }

    match vm.dstack.len() {
        0 => Err(ExecutionFailure::EvalFalse),
        1 if vm.top_is_true() => Ok(()),
        1 => Err(ExecutionFailure::EvalFalse),
        n => Err(ExecutionFailure::CleanStack(n)),
    }
}

/// Validate input `input_idx` of payment message `msg_idx` against the lock
/// script of the output it spends.
///
/// Index errors are reported as such; anything else that goes wrong is an
/// [`ScriptError::Execution`] and means the input must be rejected.
pub fn script_validate(
    crypto: &dyn CryptoBackend,
    lock_script: &[u8],
    tx: &Transaction,
    msg_idx: usize,
    input_idx: usize,
    options: ValidateOptions<'_>,
) -> Result<()> {
    let unlock_script = &tx.input(msg_idx, input_idx)?.signature_script;
    verify_input(crypto, unlock_script, lock_script, tx, msg_idx, input_idx, options).map_err(|e| {
        debug!("input {}:{} failed validation: {}", msg_idx, input_idx, e);
        ScriptError::Execution(e)
    })
}

/// Validate every input of payment message `msg_idx`, stopping at the first
/// failure.
pub fn script_validate_message(
    crypto: &dyn CryptoBackend,
    utxos: &dyn UtxoView,
    tx: &Transaction,
    msg_idx: usize,
    options: ValidateOptions<'_>,
) -> Result<()> {
    let payment = tx.payment(msg_idx)?;
    for (input_idx, input) in payment.inputs.iter().enumerate() {
        let utxo = utxos
            .get_utxo(&input.previous_out_point)
            .ok_or_else(|| ScriptError::UtxoNotFound(input.previous_out_point.to_string()))?;
        script_validate(crypto, &utxo.pk_script, tx, msg_idx, input_idx, options)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Crypto, CryptoAlgorithm};
    use crate::script::ScriptBuilder;
    use crate::sighash::SigHashType;
    use crate::types::{Asset, Message, OutPoint, PaymentPayload, TxIn, TxOut};

    fn tx_with_unlock(unlock: Vec<u8>) -> Transaction {
        let mut payment = PaymentPayload::default();
        payment.add_tx_in(TxIn::new(OutPoint::new([1; 32], 0, 0), unlock));
        payment.add_tx_out(TxOut::new(50, vec![OP_1], Asset::default()));
        Transaction { messages: vec![Message::Payment(payment)] }
    }

    fn run(unlock: Vec<u8>, lock: &[u8]) -> Result<()> {
        let crypto = Crypto::new(CryptoAlgorithm::Secp256k1);
        let tx = tx_with_unlock(unlock);
        script_validate(&crypto, lock, &tx, 0, 0, ValidateOptions::default())
    }

    fn failure(unlock: Vec<u8>, lock: &[u8]) -> ExecutionFailure {
        match run(unlock, lock) {
            Err(ScriptError::Execution(e)) => e,
            other => panic!("expected execution failure, got {:?}", other),
        }
    }

    #[test]
    fn test_simple_true() {
        assert!(run(vec![OP_1], &[]).is_ok());
        assert!(run(vec![], &[OP_1]).is_ok());
        assert!(run(vec![OP_2, OP_2], &[OP_EQUAL]).is_ok());
    }

    #[test]
    fn test_final_stack_rules() {
        assert_eq!(failure(vec![], &[]), ExecutionFailure::EvalFalse);
        assert_eq!(failure(vec![OP_0], &[]), ExecutionFailure::EvalFalse);
        assert_eq!(failure(vec![OP_1], &[OP_1]), ExecutionFailure::CleanStack(2));
        // negative zero is false
        assert_eq!(failure(vec![0x01, 0x80], &[]), ExecutionFailure::EvalFalse);
    }

    #[test]
    fn test_stack_underflow() {
        assert_eq!(failure(vec![], &[OP_DUP]), ExecutionFailure::StackUnderflow);
        assert_eq!(failure(vec![OP_1], &[OP_EQUAL]), ExecutionFailure::StackUnderflow);
        assert_eq!(failure(vec![OP_1], &[OP_2ROT]), ExecutionFailure::StackUnderflow);
        assert_eq!(failure(vec![], &[OP_FROMALTSTACK]), ExecutionFailure::StackUnderflow);
    }

    #[test]
    fn test_stack_shuffles() {
        // 1 2 3 ROT -> 2 3 1
        assert!(run(vec![OP_1, OP_2, OP_3], &[OP_ROT, OP_1, OP_EQUALVERIFY, OP_DROP, OP_2, OP_EQUAL]).is_ok());
        // 1 2 SWAP -> 2 1
        assert!(run(vec![OP_1, OP_2], &[OP_SWAP, OP_1, OP_EQUALVERIFY, OP_2, OP_EQUAL]).is_ok());
        // 1 2 TUCK -> 2 1 2
        assert!(run(vec![OP_1, OP_2], &[OP_TUCK, OP_DEPTH, OP_3, OP_EQUALVERIFY, OP_2DROP, OP_2, OP_EQUAL]).is_ok());
        // 1 2 3 4 2SWAP -> 3 4 1 2
        assert!(run(
            vec![OP_1, OP_2, OP_3, 0x54],
            &[OP_2SWAP, OP_2, OP_EQUALVERIFY, OP_1, OP_EQUALVERIFY, OP_2DROP, OP_1]
        )
        .is_ok());
        // PICK / ROLL
        assert!(run(vec![OP_3, OP_2, OP_1], &[OP_2, OP_PICK, OP_3, OP_EQUALVERIFY, OP_2DROP, OP_DROP, OP_1]).is_ok());
        assert!(run(vec![OP_3, OP_2, OP_1], &[OP_2, OP_ROLL, OP_3, OP_EQUALVERIFY, OP_2DROP, OP_1]).is_ok());
        assert_eq!(failure(vec![OP_1], &[small_int_opcode(5), OP_PICK]), ExecutionFailure::InvalidStackIndex);
        // alt stack
        assert!(run(vec![OP_1, OP_2], &[OP_TOALTSTACK, OP_DROP, OP_FROMALTSTACK]).is_ok());
        // SIZE
        assert!(run(vec![0x02, 0xaa, 0xbb], &[OP_SIZE, OP_2, OP_EQUALVERIFY, OP_DROP, OP_1]).is_ok());
    }

    #[test]
    fn test_conditionals() {
        assert!(run(vec![OP_1], &[OP_IF, OP_1, OP_ELSE, OP_0, OP_ENDIF]).is_ok());
        assert_eq!(failure(vec![OP_0], &[OP_IF, OP_1, OP_ELSE, OP_0, OP_ENDIF]), ExecutionFailure::EvalFalse);
        assert!(run(vec![OP_0], &[OP_NOTIF, OP_1, OP_ENDIF]).is_ok());
        // unexecuted branch skips invalid opcodes
        assert!(run(vec![OP_0], &[OP_IF, OP_RETURN, OP_ENDIF, OP_1]).is_ok());
        assert_eq!(failure(vec![OP_1], &[OP_IF, OP_1]), ExecutionFailure::UnbalancedConditional);
        assert_eq!(failure(vec![OP_1], &[OP_ENDIF]), ExecutionFailure::UnbalancedConditional);
        assert_eq!(failure(vec![OP_1], &[OP_ELSE]), ExecutionFailure::UnbalancedConditional);
    }

    #[test]
    fn test_disabled_even_when_unexecuted() {
        assert_eq!(
            failure(vec![OP_0], &[OP_IF, OP_CAT, OP_ENDIF, OP_1]),
            ExecutionFailure::DisabledOpcode(OP_CAT)
        );
        assert_eq!(failure(vec![OP_1, OP_1], &[OP_MUL]), ExecutionFailure::DisabledOpcode(OP_MUL));
    }

    #[test]
    fn test_invalid_and_return() {
        assert_eq!(failure(vec![OP_1], &[OP_1ADD]), ExecutionFailure::InvalidOpcode(OP_1ADD));
        assert_eq!(failure(vec![OP_1], &[OP_RESERVED]), ExecutionFailure::InvalidOpcode(OP_RESERVED));
        assert_eq!(failure(vec![OP_1], &[OP_RETURN]), ExecutionFailure::OpReturn);
        assert_eq!(failure(vec![OP_0], &[OP_VERIFY]), ExecutionFailure::VerifyFailed);
        assert_eq!(failure(vec![OP_1, OP_2], &[OP_EQUALVERIFY]), ExecutionFailure::EqualVerify);
    }

    #[test]
    fn test_limits() {
        let long = vec![OP_NOP; MAX_SCRIPT_SIZE + 1];
        assert_eq!(failure(vec![OP_1], &long), ExecutionFailure::ScriptTooLong(MAX_SCRIPT_SIZE + 1));

        let many_ops = vec![OP_NOP; MAX_OPS_PER_SCRIPT + 1];
        assert_eq!(failure(vec![OP_1], &many_ops), ExecutionFailure::OpCountExceeded);
        assert!(run(vec![OP_1], &vec![OP_NOP; MAX_OPS_PER_SCRIPT]).is_ok());

        let mut big_push = vec![OP_PUSHDATA2, 0x09, 0x02];
        big_push.extend_from_slice(&[0u8; 521]);
        assert_eq!(failure(big_push, &[OP_1]), ExecutionFailure::PushSize(521));

        assert_eq!(failure(vec![], &vec![OP_1; MAX_STACK_SIZE + 1]), ExecutionFailure::StackOverflow);
    }

    #[test]
    fn test_malformed_script_is_execution_failure() {
        assert!(matches!(failure(vec![0x05, 0x01], &[OP_1]), ExecutionFailure::Malformed(_)));
    }

    #[test]
    fn test_hash_ops() {
        let data = b"abc".to_vec();
        let digest = Sha256::digest(&data).to_vec();
        let unlock = ScriptBuilder::new().add_data(&data).script().unwrap();
        let lock = ScriptBuilder::new().add_op(OP_SHA256).add_data(&digest).add_op(OP_EQUAL).script().unwrap();
        assert!(run(unlock.clone(), &lock).is_ok());

        let digest = sha256d::Hash::hash(&data).into_inner();
        let lock = ScriptBuilder::new().add_op(OP_HASH256).add_data(&digest).add_op(OP_EQUAL).script().unwrap();
        assert!(run(unlock, &lock).is_ok());
    }

    #[test]
    fn test_checksig_with_sighash() {
        let crypto = Crypto::new(CryptoAlgorithm::Secp256k1);
        let key = crypto.key_gen().unwrap();
        let pub_key = crypto.private_key_to_pub_key(&key).unwrap();
        let lock = ScriptBuilder::new().add_data(&pub_key).add_op(OP_CHECKSIG).script().unwrap();

        let mut tx = tx_with_unlock(vec![]);
        let data = calc_signature_data(&lock, SigHashType::ALL, &tx, 0, 0).unwrap();
        let mut sig = crypto.sign(&key, &data).unwrap();
        sig.push(SigHashType::ALL.0);
        tx.payment_mut(0).unwrap().inputs[0].signature_script = ScriptBuilder::new().add_data(&sig).script().unwrap();

        let cache = SigCache::new(16);
        let options = ValidateOptions::default().with_sig_cache(&cache);
        assert!(script_validate(&crypto, &lock, &tx, 0, 0, options).is_ok());
        assert_eq!(cache.len(), 1);
        assert!(script_validate(&crypto, &lock, &tx, 0, 0, options).is_ok());

        tx.payment_mut(0).unwrap().outputs[0].value = 51;
        assert_eq!(
            script_validate(&crypto, &lock, &tx, 0, 0, options),
            Err(ScriptError::Execution(ExecutionFailure::EvalFalse))
        );
    }

    #[test]
    fn test_multisig_null_dummy_and_counts() {
        let key = vec![0x02; 33];
        let lock = ScriptBuilder::new()
            .add_op(OP_1)
            .add_data(&key)
            .add_op(OP_1)
            .add_op(OP_CHECKMULTISIG)
            .script()
            .unwrap();
        assert_eq!(failure(vec![OP_1, OP_0], &lock), ExecutionFailure::NullDummy);
        // zero-of-zero with an empty dummy is vacuously true
        assert!(run(vec![OP_0, OP_0, OP_0], &[OP_CHECKMULTISIG]).is_ok());
        assert_eq!(failure(vec![OP_1], &[OP_CHECKMULTISIG]), ExecutionFailure::StackUnderflow);
        assert_eq!(failure(vec![OP_0, OP_1, OP_0], &[OP_CHECKMULTISIG]), ExecutionFailure::SigCount);
        assert_eq!(failure(vec![0x01, 21], &[OP_CHECKMULTISIG]), ExecutionFailure::PubKeyCount);
    }

    #[test]
    fn test_script_hash_requires_push_only() {
        let redeem = vec![OP_1];
        let lock = ScriptBuilder::new()
            .add_op(OP_HASH160)
            .add_data(&hash160(&redeem))
            .add_op(OP_EQUAL)
            .script()
            .unwrap();
        let good = ScriptBuilder::new().add_data(&redeem).script().unwrap();
        // `add_data(&[OP_1])` is a one-byte push of 0x51
        assert_eq!(good, vec![0x01, OP_1]);
        assert!(run(good, &lock).is_ok());

        let mut bad = vec![OP_NOP];
        bad.extend_from_slice(&[0x01, OP_1]);
        assert_eq!(failure(bad, &lock), ExecutionFailure::NotPushOnly);

        let wrong = ScriptBuilder::new().add_data(&[OP_0]).script().unwrap();
        assert_eq!(failure(wrong, &lock), ExecutionFailure::EvalFalse);
    }

    #[test]
    fn test_cast_to_bool() {
        assert!(!cast_to_bool(&[]));
        assert!(!cast_to_bool(&[0, 0]));
        assert!(!cast_to_bool(&[0, 0x80]));
        assert!(cast_to_bool(&[0x80, 0]));
        assert!(cast_to_bool(&[1]));
    }
}
