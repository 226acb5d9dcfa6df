//! End-to-end signing and validation scenarios

use std::collections::HashMap;

use token_script::address::hash160;
use token_script::opcodes::*;
use token_script::script::ScriptBuilder;
use token_script::sighash::calc_signature_data;
use token_script::sign::merge_partial_multisig;
use token_script::standard::{multisig_keys, p2ch_lock_script, p2pkh_lock_script, p2sh_lock_script};
use token_script::*;

fn no_scripts() -> HashMap<Address, Vec<u8>> {
    HashMap::new()
}

fn payment_tx(inputs: usize, outputs: usize) -> Transaction {
    let mut payment = PaymentPayload::default();
    for i in 0..inputs {
        payment.add_tx_in(TxIn::new(OutPoint::new([0x10 + i as u8; 32], 0, i as u32), vec![]));
    }
    for i in 0..outputs {
        payment.add_tx_out(TxOut::new(1_000 + i as u64, vec![OP_1], Asset::default()));
    }
    Transaction { messages: vec![Message::Payment(payment)] }
}

fn set_unlock(tx: &mut Transaction, input_idx: usize, script: Vec<u8>) {
    tx.payment_mut(0).unwrap().inputs[input_idx].signature_script = script;
}

/// One key store per key, plus the public keys in generation order
fn key_holders(engine: &TokenEngine, n: usize) -> (Vec<MemoryKeyStore>, Vec<Vec<u8>>) {
    let mut stores = Vec::new();
    let mut pubkeys = Vec::new();
    for _ in 0..n {
        let mut store = engine.new_key_store();
        let addr = store.generate_key().unwrap();
        pubkeys.push(store.public_key(&addr).unwrap());
        stores.push(store);
    }
    (stores, pubkeys)
}

#[test]
fn test_p2pkh_all_algorithms() {
    for algorithm in [CryptoAlgorithm::Secp256k1, CryptoAlgorithm::P256, CryptoAlgorithm::Sm2] {
        let engine = TokenEngine::from_config(&EngineConfig { algorithm, sig_cache_size: 10 });
        let mut store = engine.new_key_store();
        let addr = store.generate_key().unwrap();
        let lock = engine.generate_lock_script(&addr).unwrap();

        let mut tx = payment_tx(1, 1);
        let unlock = engine
            .sign_one_payment_input(&tx, 0, 0, &lock, SigHashType::ALL, &store, &no_scripts(), &[])
            .unwrap();
        set_unlock(&mut tx, 0, unlock);
        assert!(engine.script_validate(&lock, &tx, 0, 0, None).is_ok(), "{}", algorithm);

        tx.payment_mut(0).unwrap().outputs[0].value += 1;
        assert!(engine.script_validate(&lock, &tx, 0, 0, None).is_err(), "{}", algorithm);
    }
}

#[test]
fn test_bare_multisig_signing_order() {
    let engine = TokenEngine::new();
    let (stores, pubkeys) = key_holders(&engine, 3);
    let lock = engine.generate_redeem_script(2, &pubkeys).unwrap();
    let tx = payment_tx(1, 1);

    let sign = |store: &MemoryKeyStore, previous: &[u8]| {
        engine
            .sign_one_payment_input(&tx, 0, 0, &lock, SigHashType::ALL, store, &no_scripts(), previous)
            .unwrap()
    };

    let a = sign(&stores[0], &[]);
    let ab = sign(&stores[1], &a);
    let b = sign(&stores[1], &[]);
    let ba = sign(&stores[0], &b);

    for unlock in [ab, ba] {
        let mut signed = tx.clone();
        set_unlock(&mut signed, 0, unlock);
        assert!(engine.script_validate(&lock, &signed, 0, 0, None).is_ok());
    }

    let mut partial = tx.clone();
    set_unlock(&mut partial, 0, a);
    assert!(engine.script_validate(&lock, &partial, 0, 0, None).is_err());
}

#[test]
fn test_p2sh_multisig_sk1_then_sk2() {
    let engine = TokenEngine::new();
    let (stores, pubkeys) = key_holders(&engine, 3);
    let redeem = engine.generate_redeem_script(2, &pubkeys).unwrap();
    let lock = p2sh_lock_script(&hash160(&redeem)).unwrap();
    let scripts: HashMap<Address, Vec<u8>> = [(Address::from_script(&redeem), redeem.clone())].into_iter().collect();
    let mut tx = payment_tx(1, 1);

    let sk1 = engine
        .sign_one_payment_input(&tx, 0, 0, &lock, SigHashType::ALL, &stores[0], &scripts, &[])
        .unwrap();
    set_unlock(&mut tx, 0, sk1.clone());
    let err = engine.script_validate(&lock, &tx, 0, 0, None).unwrap_err();
    assert!(err.is_execution_failure());

    let sk12 = engine
        .sign_one_payment_input(&tx, 0, 0, &lock, SigHashType::ALL, &stores[1], &scripts, &sk1)
        .unwrap();
    set_unlock(&mut tx, 0, sk12);
    assert!(engine.script_validate(&lock, &tx, 0, 0, None).is_ok());

    let signers = engine.get_script_signers(&tx, 0, 0).unwrap();
    assert_eq!(signers.len(), 2);
    assert!(signers.contains(&Address::from_pubkey(&pubkeys[0])));
    assert!(signers.contains(&Address::from_pubkey(&pubkeys[1])));
}

#[test]
fn test_merge_reports_progress() {
    let engine = TokenEngine::new();
    let (stores, pubkeys) = key_holders(&engine, 3);
    let redeem = engine.generate_redeem_script(2, &pubkeys).unwrap();
    let tx = payment_tx(1, 1);
    let crypto = engine.crypto();

    let first = merge_partial_multisig(&*crypto, &tx, 0, 0, &[], Some(&redeem), SigHashType::ALL, &stores[2], &[])
        .unwrap();
    assert_eq!((first.signatures, first.required), (1, 2));
    assert!(matches!(first.clone().into_complete(), Err(ScriptError::MultisigIncomplete { have: 1, need: 2 })));

    // merging the same partial again changes nothing
    let again =
        merge_partial_multisig(&*crypto, &tx, 0, 0, &[], Some(&redeem), SigHashType::ALL, &stores[2], &first.script)
            .unwrap();
    assert_eq!(again, first);

    let done = merge_partial_multisig(&*crypto, &tx, 0, 0, &[], Some(&redeem), SigHashType::ALL, &stores[0], &again.script)
        .unwrap();
    assert!(done.is_complete());
}

#[test]
fn test_sighash_single_commits_to_own_output() {
    let engine = TokenEngine::new();
    let mut store = engine.new_key_store();
    let addr = store.generate_key().unwrap();
    let lock = p2pkh_lock_script(&addr.hash).unwrap();

    let mut tx = payment_tx(1, 3);
    let unlock = engine
        .sign_one_payment_input(&tx, 0, 0, &lock, SigHashType::SINGLE, &store, &no_scripts(), &[])
        .unwrap();
    set_unlock(&mut tx, 0, unlock);
    assert!(engine.script_validate(&lock, &tx, 0, 0, None).is_ok());

    let mut replaced = tx.clone();
    replaced.payment_mut(0).unwrap().outputs.truncate(1);
    replaced.payment_mut(0).unwrap().add_tx_out(TxOut::new(7, vec![OP_2], Asset::default()));
    assert!(engine.script_validate(&lock, &replaced, 0, 0, None).is_ok());

    let mut changed = tx.clone();
    changed.payment_mut(0).unwrap().outputs[0].value = 1;
    assert!(engine.script_validate(&lock, &changed, 0, 0, None).is_err());
}

#[test]
fn test_sighash_single_without_output_fails_to_sign() {
    let engine = TokenEngine::new();
    let mut store = engine.new_key_store();
    let addr = store.generate_key().unwrap();
    let lock = p2pkh_lock_script(&addr.hash).unwrap();
    let tx = payment_tx(2, 1);
    let result = engine.sign_one_payment_input(&tx, 0, 1, &lock, SigHashType::SINGLE, &store, &no_scripts(), &[]);
    assert_eq!(result, Err(ScriptError::SighashSingleNoOutput));
}

#[test]
fn test_sighash_none_allows_new_outputs() {
    let engine = TokenEngine::new();
    let mut store = engine.new_key_store();
    let addr = store.generate_key().unwrap();
    let lock = p2pkh_lock_script(&addr.hash).unwrap();

    let mut tx = payment_tx(1, 1);
    let unlock = engine
        .sign_one_payment_input(&tx, 0, 0, &lock, SigHashType::NONE, &store, &no_scripts(), &[])
        .unwrap();
    set_unlock(&mut tx, 0, unlock);
    tx.payment_mut(0).unwrap().add_tx_out(TxOut::new(99, vec![OP_3], Asset::default()));
    tx.payment_mut(0).unwrap().outputs[0].value = 5;
    assert!(engine.script_validate(&lock, &tx, 0, 0, None).is_ok());
}

#[test]
fn test_anyonecanpay_allows_new_inputs() {
    let engine = TokenEngine::new();
    let mut store = engine.new_key_store();
    let addr = store.generate_key().unwrap();
    let lock = p2pkh_lock_script(&addr.hash).unwrap();

    let mut tx = payment_tx(1, 1);
    let unlock = engine
        .sign_one_payment_input(&tx, 0, 0, &lock, SigHashType::ALL_ANYONECANPAY, &store, &no_scripts(), &[])
        .unwrap();
    set_unlock(&mut tx, 0, unlock);
    tx.payment_mut(0).unwrap().add_tx_in(TxIn::new(OutPoint::new([0x77; 32], 0, 0), vec![OP_1]));
    assert!(engine.script_validate(&lock, &tx, 0, 0, None).is_ok());

    // plain ALL does not survive the same change
    let mut strict = payment_tx(1, 1);
    let unlock = engine
        .sign_one_payment_input(&strict, 0, 0, &lock, SigHashType::ALL, &store, &no_scripts(), &[])
        .unwrap();
    set_unlock(&mut strict, 0, unlock);
    strict.payment_mut(0).unwrap().add_tx_in(TxIn::new(OutPoint::new([0x77; 32], 0, 0), vec![]));
    assert!(engine.script_validate(&lock, &strict, 0, 0, None).is_err());
}

#[test]
fn test_op_return_output_is_unspendable() {
    let engine = TokenEngine::new();
    let mut store = engine.new_key_store();
    store.generate_key().unwrap();
    let lock = ScriptBuilder::new().add_op(OP_RETURN).add_data(b"token memo").script().unwrap();
    assert!(engine.is_unspendable(&lock));

    let tx = payment_tx(1, 1);
    let result = engine.sign_one_payment_input(&tx, 0, 0, &lock, SigHashType::ALL, &store, &no_scripts(), &[]);
    assert_eq!(result, Err(ScriptError::UnsupportedScript(ScriptClass::NullData)));

    for unlock in [vec![], vec![OP_1], vec![OP_1, OP_1], vec![0x02, 0xab, 0xcd]] {
        let mut tx = payment_tx(1, 1);
        set_unlock(&mut tx, 0, unlock);
        let err = engine.script_validate(&lock, &tx, 0, 0, None).unwrap_err();
        assert!(err.is_execution_failure());
    }
}

#[test]
fn test_contract_hash_jury_spend() {
    let engine = TokenEngine::new();
    let (stores, pubkeys) = key_holders(&engine, 3);
    let redeem = engine.generate_redeem_script(2, &pubkeys).unwrap();
    let contract = Address::new(AddressType::ContractHash, hash160(&redeem));
    let lock = p2ch_lock_script(&contract.hash).unwrap();
    assert_eq!(engine.get_address_from_script(&lock).unwrap(), contract);

    let mut tx = payment_tx(1, 1);

    // Jurors sign independently; the signatures are assembled in key order
    let data = calc_signature_data(&redeem, SigHashType::ALL, &tx, 0, 0).unwrap();
    let (ordered_keys, _) = multisig_keys(&redeem).unwrap();
    let mut signatures = Vec::new();
    for key in &ordered_keys {
        let addr = Address::from_pubkey(key);
        if let Some(store) = stores.iter().find(|s| s.public_key(&addr).is_some()) {
            if signatures.len() < 2 {
                let mut sig = store.sign(&addr, &data).unwrap();
                sig.push(SigHashType::ALL.0);
                signatures.push(sig);
            }
        }
    }
    let unlock = engine.merge_contract_unlock_script(&signatures, &redeem).unwrap();
    set_unlock(&mut tx, 0, unlock);

    let registered: HashMap<Address, Vec<u8>> = [(contract, redeem.clone())].into_iter().collect();
    assert!(engine.script_validate(&lock, &tx, 0, 0, None).is_ok());
    assert!(engine.script_validate(&lock, &tx, 0, 0, Some(&registered)).is_ok());
    assert_eq!(engine.get_script_signers(&tx, 0, 0).unwrap().len(), 2);

    let other_redeem = engine.generate_redeem_script(1, &pubkeys).unwrap();
    let wrong: HashMap<Address, Vec<u8>> = [(contract, other_redeem)].into_iter().collect();
    assert_eq!(
        engine.script_validate(&lock, &tx, 0, 0, Some(&wrong)),
        Err(ScriptError::Execution(ExecutionFailure::RedeemScriptMismatch))
    );
}

#[test]
fn test_contract_hash_signed_through_script_db() {
    let engine = TokenEngine::new();
    let mut store = engine.new_key_store();
    let pubkeys: Vec<Vec<u8>> = (0..2)
        .map(|_| {
            let addr = store.generate_key().unwrap();
            store.public_key(&addr).unwrap()
        })
        .collect();
    let redeem = engine.generate_redeem_script(2, &pubkeys).unwrap();
    let contract = engine.get_redeem_address(AddressType::ContractHash, &redeem);
    let lock = engine.generate_lock_script(&contract).unwrap();
    let scripts: HashMap<Address, Vec<u8>> = [(contract, redeem)].into_iter().collect();

    let mut tx = payment_tx(1, 1);
    let unlock = engine
        .sign_one_payment_input(&tx, 0, 0, &lock, SigHashType::ALL, &store, &scripts, &[])
        .unwrap();
    set_unlock(&mut tx, 0, unlock);
    assert!(engine.script_validate(&lock, &tx, 0, 0, Some(&scripts)).is_ok());

    // a script-hash lock over the same redeem script is a different output
    let p2sh = p2sh_lock_script(&contract.hash).unwrap();
    assert_ne!(p2sh, lock);
}

#[test]
fn test_sign_all_and_validate_message() {
    let engine = TokenEngine::new();
    let mut store = engine.new_key_store();
    let mut tx = payment_tx(4, 2);
    let mut utxos = UtxoSet::new();
    for input in tx.payment(0).unwrap().inputs.clone() {
        let addr = store.generate_key().unwrap();
        let lock = engine.generate_lock_script(&addr).unwrap();
        utxos.insert(input.previous_out_point, TxOut::new(500, lock, Asset::default()));
    }

    engine
        .sign_tx_all_payment_inputs(&mut tx, SigHashType::ALL, &utxos, &store, &no_scripts())
        .unwrap();
    assert!(engine.script_validate_message(&utxos, &tx, 0, None).is_ok());

    tx.payment_mut(0).unwrap().inputs[2].signature_script.clear();
    assert!(engine.script_validate_message(&utxos, &tx, 0, None).is_err());

    utxos.clear();
    assert!(matches!(engine.script_validate_message(&utxos, &tx, 0, None), Err(ScriptError::UtxoNotFound(_))));
}

#[test]
fn test_parallel_validation() {
    let engine = TokenEngine::new();
    let mut store = engine.new_key_store();
    let mut tx = payment_tx(8, 1);
    let mut utxos = UtxoSet::new();
    let mut locks = Vec::new();
    for input in tx.payment(0).unwrap().inputs.clone() {
        let addr = store.generate_key().unwrap();
        let lock = engine.generate_lock_script(&addr).unwrap();
        utxos.insert(input.previous_out_point, TxOut::new(10, lock.clone(), Asset::default()));
        locks.push(lock);
    }
    engine
        .sign_tx_all_payment_inputs(&mut tx, SigHashType::ALL, &utxos, &store, &no_scripts())
        .unwrap();

    let engine = &engine;
    let tx = &tx;
    std::thread::scope(|s| {
        let handles: Vec<_> = locks
            .iter()
            .enumerate()
            .map(|(i, lock)| s.spawn(move || engine.script_validate(lock, tx, 0, i, None)))
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
    });
    assert_eq!(engine.sig_cache().len(), 8);
}
