//! Error types for script building, signing and validation

use crate::standard::ScriptClass;
use thiserror::Error;

/// Reasons a script execution rejects an input.
///
/// Any of these means the input is invalid; callers never retry or
/// partially accept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionFailure {
    #[error("stack underflow")]
    StackUnderflow,

    #[error("stack overflow")]
    StackOverflow,

    #[error("disabled opcode 0x{0:02x}")]
    DisabledOpcode(u8),

    #[error("invalid opcode 0x{0:02x}")]
    InvalidOpcode(u8),

    #[error("final stack empty or top value false")]
    EvalFalse,

    #[error("stack holds {0} elements after execution, expected 1")]
    CleanStack(usize),

    #[error("script too long: {0} bytes")]
    ScriptTooLong(usize),

    #[error("operation count exceeded")]
    OpCountExceeded,

    #[error("pushed element of {0} bytes exceeds the element size limit")]
    PushSize(usize),

    #[error("OP_VERIFY failed")]
    VerifyFailed,

    #[error("OP_EQUALVERIFY failed")]
    EqualVerify,

    #[error("OP_CHECKSIGVERIFY failed")]
    CheckSigVerify,

    #[error("OP_CHECKMULTISIGVERIFY failed")]
    CheckMultiSigVerify,

    #[error("OP_RETURN executed")]
    OpReturn,

    #[error("unbalanced conditional")]
    UnbalancedConditional,

    #[error("invalid public key count")]
    PubKeyCount,

    #[error("invalid signature count")]
    SigCount,

    #[error("multisig dummy element is not empty")]
    NullDummy,

    #[error("unlock script is not push-only")]
    NotPushOnly,

    #[error("redeem script does not match the registered contract script")]
    RedeemScriptMismatch,

    #[error("stack index out of range")]
    InvalidStackIndex,

    #[error("malformed script: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Script parse error: {0}")]
    Parse(String),

    #[error("Script classification is ambiguous")]
    ClassificationAmbiguous,

    #[error("No key available for address {0}")]
    KeyNotFound(String),

    #[error("Invalid signature")]
    SignatureInvalid,

    #[error("Multisig incomplete: {have} of {need} signatures")]
    MultisigIncomplete { have: usize, need: usize },

    #[error("Script execution failed: {0}")]
    Execution(#[from] ExecutionFailure),

    #[error("Unsupported script class: {0:?}")]
    UnsupportedScript(ScriptClass),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Index out of range: {0}")]
    IndexOutOfRange(String),

    #[error("No unspent output for {0}")]
    UtxoNotFound(String),

    #[error("SIGHASH_SINGLE input has no matching output")]
    SighashSingleNoOutput,

    #[error("Script exceeds maximum length: {0} bytes")]
    ScriptTooLong(usize),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScriptError {
    /// True for failures that came out of script execution.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, ScriptError::Execution(_))
    }
}

pub type Result<T> = std::result::Result<T, ScriptError>;
