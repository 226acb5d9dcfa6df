//! Core ledger types consumed by the script engine

use bitcoin_hashes::{sha256d, Hash as BitcoinHash};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, ScriptError};
use crate::serialization::serialize_transaction;

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// OutPoint: (transaction hash, message index, output index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_hash: Hash,
    pub message_index: u32,
    pub out_index: u32,
}

impl OutPoint {
    pub fn new(tx_hash: Hash, message_index: u32, out_index: u32) -> Self {
        Self { tx_hash, message_index, out_index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Outpoint[TxId:{},MsgIdx:{},OutIdx:{}]",
            hex::encode(self.tx_hash),
            self.message_index,
            self.out_index
        )
    }
}

/// Asset carried by an output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: [u8; 16],
    pub unique_id: [u8; 16],
}

/// Transaction input: the spent outpoint plus the unlocking script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub previous_out_point: OutPoint,
    pub signature_script: ByteString,
}

impl TxIn {
    pub fn new(previous_out_point: OutPoint, signature_script: ByteString) -> Self {
        Self { previous_out_point, signature_script }
    }
}

/// Transaction output: value, locking script and asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: u64,
    pub pk_script: ByteString,
    pub asset: Asset,
}

impl TxOut {
    pub fn new(value: u64, pk_script: ByteString, asset: Asset) -> Self {
        Self { value, pk_script, asset }
    }
}

/// Payment message payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPayload {
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl PaymentPayload {
    pub fn add_tx_in(&mut self, input: TxIn) {
        self.inputs.push(input);
    }

    pub fn add_tx_out(&mut self, output: TxOut) {
        self.outputs.push(output);
    }
}

/// Opaque data message payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPayload {
    pub main_data: ByteString,
}

/// One message of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Payment(PaymentPayload),
    Data(DataPayload),
}

impl Message {
    pub fn as_payment(&self) -> Option<&PaymentPayload> {
        match self {
            Message::Payment(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_payment_mut(&mut self) -> Option<&mut PaymentPayload> {
        match self {
            Message::Payment(p) => Some(p),
            _ => None,
        }
    }
}

/// Transaction: an ordered list of messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub messages: Vec<Message>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transaction id: double SHA-256 over the full serialization
    pub fn hash(&self) -> Hash {
        sha256d::Hash::hash(&serialize_transaction(self)).into_inner()
    }

    /// Payment payload of message `msg_idx`
    pub fn payment(&self, msg_idx: usize) -> Result<&PaymentPayload> {
        self.messages
            .get(msg_idx)
            .ok_or_else(|| ScriptError::IndexOutOfRange(format!("message {}", msg_idx)))?
            .as_payment()
            .ok_or_else(|| ScriptError::IndexOutOfRange(format!("message {} is not a payment", msg_idx)))
    }

    pub fn payment_mut(&mut self, msg_idx: usize) -> Result<&mut PaymentPayload> {
        self.messages
            .get_mut(msg_idx)
            .ok_or_else(|| ScriptError::IndexOutOfRange(format!("message {}", msg_idx)))?
            .as_payment_mut()
            .ok_or_else(|| ScriptError::IndexOutOfRange(format!("message {} is not a payment", msg_idx)))
    }

    /// Input `input_idx` of payment message `msg_idx`
    pub fn input(&self, msg_idx: usize, input_idx: usize) -> Result<&TxIn> {
        self.payment(msg_idx)?
            .inputs
            .get(input_idx)
            .ok_or_else(|| ScriptError::IndexOutOfRange(format!("input {} of message {}", input_idx, msg_idx)))
    }
}

/// Read access to the UTXO set (provided by the storage layer)
pub trait UtxoView {
    fn get_utxo(&self, outpoint: &OutPoint) -> Option<TxOut>;
}

/// UTXO Set: OutPoint → TxOut
pub type UtxoSet = HashMap<OutPoint, TxOut>;

impl UtxoView for UtxoSet {
    fn get_utxo(&self, outpoint: &OutPoint) -> Option<TxOut> {
        self.get(outpoint).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        let mut payment = PaymentPayload::default();
        payment.add_tx_in(TxIn::new(OutPoint::new([1; 32], 0, 0), vec![]));
        payment.add_tx_out(TxOut::new(1000, vec![0x51], Asset::default()));
        Transaction { messages: vec![Message::Payment(payment)] }
    }

    #[test]
    fn test_hash_depends_on_unlock_script() {
        let tx = sample_tx();
        let mut signed = tx.clone();
        signed.payment_mut(0).unwrap().inputs[0].signature_script = vec![0x51];
        assert_ne!(tx.hash(), signed.hash());
        assert_eq!(tx.hash(), sample_tx().hash());
    }

    #[test]
    fn test_payment_accessors() {
        let mut tx = sample_tx();
        tx.messages.push(Message::Data(DataPayload { main_data: b"hello".to_vec() }));
        assert!(tx.payment(0).is_ok());
        assert!(matches!(tx.payment(1), Err(ScriptError::IndexOutOfRange(_))));
        assert!(matches!(tx.payment(2), Err(ScriptError::IndexOutOfRange(_))));
        assert!(tx.input(0, 0).is_ok());
        assert!(tx.input(0, 1).is_err());
    }

    #[test]
    fn test_utxo_view() {
        let mut utxos = UtxoSet::new();
        let op = OutPoint::new([2; 32], 0, 1);
        utxos.insert(op, TxOut::new(5, vec![0x51], Asset::default()));
        assert_eq!(utxos.get_utxo(&op).unwrap().value, 5);
        assert!(utxos.get_utxo(&OutPoint::new([2; 32], 0, 2)).is_none());
    }
}
