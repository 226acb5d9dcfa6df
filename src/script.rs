//! Script builder and parser
//!
//! A script is a byte sequence of opcodes, some of which carry inline data:
//!
//! - `0x01..=0x4b`: the opcode itself is the data length
//! - `OP_PUSHDATA1/2/4`: a 1/2/4-byte little-endian length prefix follows
//!
//! The builder always emits the canonical (minimal) push for a payload and
//! the parser is its exact inverse.

use crate::constants::*;
use crate::error::{Result, ScriptError};
use crate::opcodes::*;

/// One decoded opcode together with its push payload (empty for non-pushes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOpcode {
    pub opcode: u8,
    pub data: Vec<u8>,
}

impl ParsedOpcode {
    pub fn op(opcode: u8) -> Self {
        Self { opcode, data: Vec::new() }
    }

    /// Is this a data push (including OP_0)?
    pub fn is_push_data(&self) -> bool {
        is_push_data(self.opcode)
    }

    /// Is this opcode counted toward the per-script operation limit?
    pub fn counts_as_op(&self) -> bool {
        self.opcode > OP_16
    }
}

/// Decode a script into opcodes.
///
/// Fails when a length prefix or payload runs past the end of the script.
pub fn parse_script(script: &[u8]) -> Result<Vec<ParsedOpcode>> {
    let mut ops = Vec::new();
    let mut i = 0usize;

    while i < script.len() {
        let opcode = script[i];
        i += 1;

        let data_len = match opcode {
            OP_DATA_1..=OP_DATA_75 => opcode as usize,
            OP_PUSHDATA1 => read_len(script, &mut i, 1)?,
            OP_PUSHDATA2 => read_len(script, &mut i, 2)?,
            OP_PUSHDATA4 => read_len(script, &mut i, 4)?,
            _ => {
                ops.push(ParsedOpcode::op(opcode));
                continue;
            }
        };

        let end = i
            .checked_add(data_len)
            .filter(|end| *end <= script.len())
            .ok_or_else(|| {
                ScriptError::Parse(format!(
                    "opcode 0x{:02x} requires {} bytes, script has {} remaining",
                    opcode,
                    data_len,
                    script.len() - i
                ))
            })?;
        ops.push(ParsedOpcode { opcode, data: script[i..end].to_vec() });
        i = end;
    }

    Ok(ops)
}

fn read_len(script: &[u8], i: &mut usize, width: usize) -> Result<usize> {
    if script.len() - *i < width {
        return Err(ScriptError::Parse(format!(
            "PUSHDATA length prefix of {} bytes truncated",
            width
        )));
    }
    let mut len = 0usize;
    for (shift, byte) in script[*i..*i + width].iter().enumerate() {
        len |= (*byte as usize) << (8 * shift);
    }
    *i += width;
    Ok(len)
}

/// Re-encode parsed opcodes into script bytes, preserving each push opcode.
pub fn unparse_script(ops: &[ParsedOpcode]) -> Result<Vec<u8>> {
    let mut script = Vec::new();
    for pop in ops {
        script.push(pop.opcode);
        match pop.opcode {
            OP_DATA_1..=OP_DATA_75 => {
                if pop.data.len() != pop.opcode as usize {
                    return Err(ScriptError::Parse(format!(
                        "opcode 0x{:02x} carries {} bytes",
                        pop.opcode,
                        pop.data.len()
                    )));
                }
            }
            OP_PUSHDATA1 => {
                let len = u8::try_from(pop.data.len())
                    .map_err(|_| ScriptError::Parse("PUSHDATA1 payload too long".to_string()))?;
                script.push(len);
            }
            OP_PUSHDATA2 => {
                let len = u16::try_from(pop.data.len())
                    .map_err(|_| ScriptError::Parse("PUSHDATA2 payload too long".to_string()))?;
                script.extend_from_slice(&len.to_le_bytes());
            }
            OP_PUSHDATA4 => {
                let len = u32::try_from(pop.data.len())
                    .map_err(|_| ScriptError::Parse("PUSHDATA4 payload too long".to_string()))?;
                script.extend_from_slice(&len.to_le_bytes());
            }
            _ => {
                if !pop.data.is_empty() {
                    return Err(ScriptError::Parse(format!(
                        "non-push opcode 0x{:02x} carries data",
                        pop.opcode
                    )));
                }
            }
        }
        script.extend_from_slice(&pop.data);
    }
    Ok(script)
}

/// Does the script consist only of pushes?
pub fn is_push_only(ops: &[ParsedOpcode]) -> bool {
    ops.iter().all(|pop| pop.opcode <= OP_16)
}

/// Can an output locked by this script never be spent?
pub fn is_unspendable(script: &[u8]) -> bool {
    match parse_script(script) {
        Ok(ops) => ops.first().map_or(false, |pop| pop.opcode == OP_RETURN),
        Err(_) => true,
    }
}

/// Drop every occurrence of `opcode` (used to strip OP_CODESEPARATOR from
/// signature subscripts).
pub fn remove_opcode(ops: &[ParsedOpcode], opcode: u8) -> Vec<ParsedOpcode> {
    ops.iter().filter(|pop| pop.opcode != opcode).cloned().collect()
}

/// Disassemble a script into a one-line human readable form.
///
/// Pushes are printed as hex, small integers as numbers and everything else
/// by opcode name.
pub fn disasm_string(script: &[u8]) -> Result<String> {
    let ops = parse_script(script)?;
    let parts: Vec<String> = ops
        .iter()
        .map(|pop| match pop.opcode {
            OP_0 => "0".to_string(),
            OP_1NEGATE => "-1".to_string(),
            op if (OP_1..=OP_16).contains(&op) => small_int_value(op).to_string(),
            op if op <= OP_PUSHDATA4 => hex::encode(&pop.data),
            op => opcode_name(op),
        })
        .collect();
    Ok(parts.join(" "))
}

/// Incremental script builder emitting canonical pushes.
///
/// The first error is latched and reported by [`ScriptBuilder::script`], so
/// calls can be chained without checking each step.
#[derive(Debug, Clone, Default)]
pub struct ScriptBuilder {
    script: Vec<u8>,
    err: Option<ScriptError>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_op(&mut self, opcode: u8) -> &mut Self {
        if self.err.is_some() {
            return self;
        }
        if self.script.len() + 1 > MAX_SCRIPT_SIZE {
            self.err = Some(ScriptError::ScriptTooLong(self.script.len() + 1));
            return self;
        }
        self.script.push(opcode);
        self
    }

    pub fn add_ops(&mut self, opcodes: &[u8]) -> &mut Self {
        for op in opcodes {
            self.add_op(*op);
        }
        self
    }

    /// Push `data` using the smallest encoding that reproduces it.
    pub fn add_data(&mut self, data: &[u8]) -> &mut Self {
        if self.err.is_some() {
            return self;
        }
        let needed = canonical_data_size(data);
        if self.script.len() + needed > MAX_SCRIPT_SIZE {
            self.err = Some(ScriptError::ScriptTooLong(self.script.len() + needed));
            return self;
        }
        if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
            self.err = Some(ScriptError::Parse(format!(
                "push of {} bytes exceeds the {} byte element limit",
                data.len(),
                MAX_SCRIPT_ELEMENT_SIZE
            )));
            return self;
        }
        self.add_data_unchecked(data);
        self
    }

    fn add_data_unchecked(&mut self, data: &[u8]) {
        let len = data.len();

        if len == 0 || (len == 1 && data[0] == 0) {
            self.script.push(OP_0);
            return;
        }
        if len == 1 && data[0] <= 16 {
            self.script.push(small_int_opcode(data[0]));
            return;
        }
        if len == 1 && data[0] == 0x81 {
            self.script.push(OP_1NEGATE);
            return;
        }

        if len <= OP_DATA_75 as usize {
            self.script.push(len as u8);
        } else if len <= 0xff {
            self.script.push(OP_PUSHDATA1);
            self.script.push(len as u8);
        } else if len <= 0xffff {
            self.script.push(OP_PUSHDATA2);
            self.script.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.script.push(OP_PUSHDATA4);
            self.script.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.script.extend_from_slice(data);
    }

    /// Push an integer as OP_N when possible, otherwise as a minimal script number
    pub fn add_int64(&mut self, value: i64) -> &mut Self {
        if value == 0 {
            return self.add_op(OP_0);
        }
        if value == -1 {
            return self.add_op(OP_1NEGATE);
        }
        if (1..=16).contains(&value) {
            return self.add_op(small_int_opcode(value as u8));
        }
        let bytes = encode_script_num(value);
        self.add_data(&bytes)
    }

    /// Finish and return the script, or the first error encountered
    pub fn script(&self) -> Result<Vec<u8>> {
        match &self.err {
            Some(err) => Err(err.clone()),
            None => Ok(self.script.clone()),
        }
    }
}

fn canonical_data_size(data: &[u8]) -> usize {
    let len = data.len();
    if len == 0 || (len == 1 && (data[0] <= 16 || data[0] == 0x81)) {
        1
    } else if len <= OP_DATA_75 as usize {
        1 + len
    } else if len <= 0xff {
        2 + len
    } else if len <= 0xffff {
        3 + len
    } else {
        5 + len
    }
}

/// Minimal little-endian sign-magnitude encoding of a script number
pub fn encode_script_num(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut result = Vec::new();
    while abs > 0 {
        result.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    if result[result.len() - 1] & 0x80 != 0 {
        result.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        let last = result.len() - 1;
        result[last] |= 0x80;
    }
    result
}

/// Decode a script number of at most `max_len` bytes
pub fn decode_script_num(bytes: &[u8], max_len: usize) -> Option<i64> {
    if bytes.len() > max_len {
        return None;
    }
    if bytes.is_empty() {
        return Some(0);
    }
    let mut result: i64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        result |= (*byte as i64) << (8 * i);
    }
    let last = bytes[bytes.len() - 1];
    if last & 0x80 != 0 {
        let mask = !(0x80i64 << (8 * (bytes.len() - 1)));
        Some(-(result & mask))
    } else {
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_data_encodings() {
        let s = ScriptBuilder::new().add_data(&[0xaa; 75]).script().unwrap();
        assert_eq!(s[0], 75);
        assert_eq!(s.len(), 76);

        let s = ScriptBuilder::new().add_data(&[0xaa; 76]).script().unwrap();
        assert_eq!(&s[..2], &[OP_PUSHDATA1, 76]);

        let s = ScriptBuilder::new().add_data(&[0xaa; 300]).script().unwrap();
        assert_eq!(&s[..3], &[OP_PUSHDATA2, 0x2c, 0x01]);
    }

    #[test]
    fn test_add_data_small_values() {
        let s = ScriptBuilder::new()
            .add_data(&[])
            .add_data(&[0])
            .add_data(&[5])
            .add_data(&[0x81])
            .add_data(&[17])
            .script()
            .unwrap();
        assert_eq!(s, vec![OP_0, OP_0, 0x55, OP_1NEGATE, 0x01, 17]);
    }

    #[test]
    fn test_add_data_element_limit() {
        let result = ScriptBuilder::new().add_data(&[0; MAX_SCRIPT_ELEMENT_SIZE + 1]).script();
        assert!(matches!(result, Err(ScriptError::Parse(_))));
    }

    #[test]
    fn test_script_too_long() {
        let mut builder = ScriptBuilder::new();
        for _ in 0..=MAX_SCRIPT_SIZE {
            builder.add_op(OP_NOP);
        }
        assert!(matches!(builder.script(), Err(ScriptError::ScriptTooLong(_))));
    }

    #[test]
    fn test_parse_pushdata_prefixes() {
        let mut script = vec![OP_PUSHDATA2, 0x03, 0x00, 1, 2, 3];
        script.extend_from_slice(&[OP_PUSHDATA4, 0x01, 0, 0, 0, 9, OP_DUP]);
        let ops = parse_script(&script).unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].data, vec![1, 2, 3]);
        assert_eq!(ops[1].data, vec![9]);
        assert_eq!(ops[2], ParsedOpcode::op(OP_DUP));
        assert_eq!(unparse_script(&ops).unwrap(), script);
    }

    #[test]
    fn test_parse_truncated() {
        assert!(parse_script(&[0x05, 1, 2]).is_err());
        assert!(parse_script(&[OP_PUSHDATA1]).is_err());
        assert!(parse_script(&[OP_PUSHDATA2, 0x01]).is_err());
        assert!(parse_script(&[OP_PUSHDATA4, 0xff, 0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_disasm() {
        let s = ScriptBuilder::new()
            .add_op(OP_DUP)
            .add_op(OP_HASH160)
            .add_data(&[0xab; 20])
            .add_op(OP_EQUALVERIFY)
            .add_op(OP_CHECKSIG)
            .script()
            .unwrap();
        assert_eq!(
            disasm_string(&s).unwrap(),
            format!("OP_DUP OP_HASH160 {} OP_EQUALVERIFY OP_CHECKSIG", "ab".repeat(20))
        );
        assert_eq!(disasm_string(&[OP_0, OP_2, OP_1NEGATE]).unwrap(), "0 2 -1");
    }

    #[test]
    fn test_push_only_and_unspendable() {
        assert!(is_push_only(&parse_script(&[OP_0, 0x01, 0x07, OP_16]).unwrap()));
        assert!(!is_push_only(&parse_script(&[OP_0, OP_DUP]).unwrap()));
        assert!(is_unspendable(&[OP_RETURN, 0x01, 0x00]));
        assert!(is_unspendable(&[0x05]));
        assert!(!is_unspendable(&[OP_1]));
    }

    #[test]
    fn test_script_num() {
        for value in [-1000i64, -129, -128, -1, 0, 1, 127, 128, 255, 256, 65535, 1 << 30] {
            let enc = encode_script_num(value);
            assert_eq!(decode_script_num(&enc, 8), Some(value), "value {}", value);
        }
        assert_eq!(encode_script_num(128), vec![0x80, 0x00]);
        assert_eq!(encode_script_num(-1), vec![0x81]);
        assert_eq!(decode_script_num(&[0; 5], 4), None);
    }

    #[test]
    fn test_add_int64() {
        let s = ScriptBuilder::new().add_int64(0).add_int64(16).add_int64(-1).add_int64(17).script().unwrap();
        assert_eq!(s, vec![OP_0, OP_16, OP_1NEGATE, 0x01, 17]);
    }
}
