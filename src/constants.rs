//! Script consensus constants
//!
//! These bound the cost of validating a single input. They are compile-time
//! constants on purpose: every validating node must agree on them.

/// Maximum script length
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum size of a single pushed stack element
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum combined size of the main and alt stacks during script execution
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of non-push operations in a script
pub const MAX_OPS_PER_SCRIPT: usize = 201;

/// Maximum number of public keys accepted by OP_CHECKMULTISIG
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Maximum number of keys in a standard (classifiable) multisig script
pub const MAX_STANDARD_MULTISIG_KEYS: usize = 16;

/// Length of a hash160 digest (address payload)
pub const HASH160_SIZE: usize = 20;

/// Compressed SEC1 public key length
pub const COMPRESSED_PUBKEY_SIZE: usize = 33;

/// Uncompressed SEC1 public key length
pub const UNCOMPRESSED_PUBKEY_SIZE: usize = 65;

/// Private key length for all supported curves
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Default number of entries kept by the signature cache
pub const DEFAULT_SIG_CACHE_SIZE: usize = 20_000;

/// Default SM2 distinguishing identifier (GM/T 0009-2012)
pub const SM2_DEFAULT_DISTID: &str = "1234567812345678";
