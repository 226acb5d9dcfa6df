//! Canonical transaction serialization
//!
//! This byte layout is what signatures commit to, so it must never change.
//!
//! - Transaction: VarInt(message count) followed by each message
//! - Message: app byte (0 = payment, 1 = data) followed by its payload
//! - Payment:
//!   - VarInt(input count), then per input: tx hash (32), message index
//!     (u32 LE), output index (u32 LE), VarBytes(unlock script)
//!   - VarInt(output count), then per output: value (u64 LE),
//!     VarBytes(lock script), asset id (16), unique id (16)
//!   - lock time (u32 LE)
//! - Data: VarBytes(payload)

use crate::types::*;

pub const APP_PAYMENT: u8 = 0;
pub const APP_DATA: u8 = 1;

/// Encode a u64 value as a VarInt
///
/// - value < 0xfd: single byte
/// - value <= 0xffff: 0xfd prefix + 2 bytes (little-endian)
/// - value <= 0xffffffff: 0xfe prefix + 4 bytes (little-endian)
/// - otherwise: 0xff prefix + 8 bytes (little-endian)
pub fn encode_varint(value: u64) -> Vec<u8> {
    if value < 0xfd {
        vec![value as u8]
    } else if value <= 0xffff {
        let mut result = vec![0xfd];
        result.extend_from_slice(&(value as u16).to_le_bytes());
        result
    } else if value <= 0xffff_ffff {
        let mut result = vec![0xfe];
        result.extend_from_slice(&(value as u32).to_le_bytes());
        result
    } else {
        let mut result = vec![0xff];
        result.extend_from_slice(&value.to_le_bytes());
        result
    }
}

fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&encode_varint(bytes.len() as u64));
    out.extend_from_slice(bytes);
}

pub(crate) fn write_tx_in(out: &mut Vec<u8>, input: &TxIn) {
    let op = &input.previous_out_point;
    out.extend_from_slice(&op.tx_hash);
    out.extend_from_slice(&op.message_index.to_le_bytes());
    out.extend_from_slice(&op.out_index.to_le_bytes());
    write_var_bytes(out, &input.signature_script);
}

pub(crate) fn write_tx_out(out: &mut Vec<u8>, output: &TxOut) {
    out.extend_from_slice(&output.value.to_le_bytes());
    write_var_bytes(out, &output.pk_script);
    out.extend_from_slice(&output.asset.asset_id);
    out.extend_from_slice(&output.asset.unique_id);
}

pub(crate) fn write_payment(out: &mut Vec<u8>, payment: &PaymentPayload) {
    out.extend_from_slice(&encode_varint(payment.inputs.len() as u64));
    for input in &payment.inputs {
        write_tx_in(out, input);
    }
    out.extend_from_slice(&encode_varint(payment.outputs.len() as u64));
    for output in &payment.outputs {
        write_tx_out(out, output);
    }
    out.extend_from_slice(&payment.lock_time.to_le_bytes());
}

pub(crate) fn write_message(out: &mut Vec<u8>, message: &Message) {
    match message {
        Message::Payment(payment) => {
            out.push(APP_PAYMENT);
            write_payment(out, payment);
        }
        Message::Data(data) => {
            out.push(APP_DATA);
            write_var_bytes(out, &data.main_data);
        }
    }
}

/// Serialize a transaction to its canonical byte form
pub fn serialize_transaction(tx: &Transaction) -> Vec<u8> {
    let mut result = Vec::new();
    result.extend_from_slice(&encode_varint(tx.messages.len() as u64));
    for message in &tx.messages {
        write_message(&mut result, message);
    }
    result
}
