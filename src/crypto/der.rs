//! Strict DER encoding of ECDSA-style (R, S) signatures
//!
//! `SEQUENCE { INTEGER r, INTEGER s }` with minimal, strictly positive
//! integers. Shared by every backend so that all of them accept exactly the
//! same encodings.

const SCALAR_SIZE: usize = 32;

/// Encode big-endian scalars `r` and `s` as a DER signature
pub fn encode(r: &[u8], s: &[u8]) -> Vec<u8> {
    let r = der_integer(r);
    let s = der_integer(s);
    let mut out = Vec::with_capacity(6 + r.len() + s.len());
    out.push(0x30);
    out.push((4 + r.len() + s.len()) as u8);
    out.push(0x02);
    out.push(r.len() as u8);
    out.extend_from_slice(&r);
    out.push(0x02);
    out.push(s.len() as u8);
    out.extend_from_slice(&s);
    out
}

fn der_integer(value: &[u8]) -> Vec<u8> {
    let first = value.iter().position(|b| *b != 0).unwrap_or(value.len());
    let trimmed = &value[first..];
    let mut out = Vec::with_capacity(trimmed.len() + 1);
    if trimmed.is_empty() || trimmed[0] & 0x80 != 0 {
        out.push(0x00);
    }
    out.extend_from_slice(trimmed);
    out
}

/// Is `sig` a strictly encoded DER signature (no hash-type byte)?
pub fn is_strict_der(sig: &[u8]) -> bool {
    // 0x30 len 0x02 lenR R 0x02 lenS S
    if sig.len() < 8 || sig.len() > 72 {
        return false;
    }
    if sig[0] != 0x30 {
        return false;
    }
    if sig[1] as usize != sig.len() - 2 {
        return false;
    }

    let len_r = sig[3] as usize;
    if 5 + len_r >= sig.len() {
        return false;
    }
    let len_s = sig[5 + len_r] as usize;
    if len_r + len_s + 6 != sig.len() {
        return false;
    }

    if sig[2] != 0x02 || len_r == 0 {
        return false;
    }
    // negative R
    if sig[4] & 0x80 != 0 {
        return false;
    }
    // excess padding on R
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }

    if sig[len_r + 4] != 0x02 || len_s == 0 {
        return false;
    }
    if sig[len_r + 6] & 0x80 != 0 {
        return false;
    }
    if len_s > 1 && sig[len_r + 6] == 0x00 && sig[len_r + 7] & 0x80 == 0 {
        return false;
    }
    true
}

/// Parse a strict DER signature into 32-byte big-endian (R, S).
///
/// Returns `None` for non-canonical encodings, zero scalars or scalars wider
/// than 256 bits.
pub fn decode(sig: &[u8]) -> Option<([u8; SCALAR_SIZE], [u8; SCALAR_SIZE])> {
    if !is_strict_der(sig) {
        return None;
    }
    let len_r = sig[3] as usize;
    let r = &sig[4..4 + len_r];
    let s = &sig[6 + len_r..];
    Some((to_scalar(r)?, to_scalar(s)?))
}

fn to_scalar(int: &[u8]) -> Option<[u8; SCALAR_SIZE]> {
    let first = int.iter().position(|b| *b != 0)?;
    let trimmed = &int[first..];
    if trimmed.len() > SCALAR_SIZE {
        return None;
    }
    let mut out = [0u8; SCALAR_SIZE];
    out[SCALAR_SIZE - trimmed.len()..].copy_from_slice(trimmed);
    Some(out)
}
