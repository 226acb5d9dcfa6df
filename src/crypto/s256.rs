//! secp256k1 / Keccak-256 backend

use secp256k1::ecdsa::Signature;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};

use super::{check_private_key_len, der, sealed, CryptoAlgorithm, CryptoBackend};
use crate::error::{Result, ScriptError};

/// secp256k1 ECDSA over Keccak-256 digests, compressed 33-byte public keys.
///
/// Signatures are always emitted low-S and verification rejects high-S
/// ones, so a third party cannot malleate a signature into a second valid
/// one.
pub struct Secp256k1Backend {
    secp: Secp256k1<All>,
}

impl Secp256k1Backend {
    pub fn new() -> Self {
        Self { secp: Secp256k1::new() }
    }

    fn digest(msg: &[u8]) -> Message {
        let digest: [u8; 32] = Keccak256::digest(msg).into();
        Message::from_digest(digest)
    }
}

impl Default for Secp256k1Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Secp256k1Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secp256k1Backend")
    }
}

impl sealed::Sealed for Secp256k1Backend {}

impl CryptoBackend for Secp256k1Backend {
    fn algorithm(&self) -> CryptoAlgorithm {
        CryptoAlgorithm::Secp256k1
    }

    fn key_gen(&self) -> Result<Vec<u8>> {
        let (secret, _) = self.secp.generate_keypair(&mut rand::thread_rng());
        Ok(secret.secret_bytes().to_vec())
    }

    fn private_key_to_pub_key(&self, private_key: &[u8]) -> Result<Vec<u8>> {
        check_private_key_len(private_key)?;
        let secret = SecretKey::from_slice(private_key)
            .map_err(|e| ScriptError::Crypto(format!("invalid secp256k1 private key: {}", e)))?;
        Ok(PublicKey::from_secret_key(&self.secp, &secret).serialize().to_vec())
    }

    fn hash(&self, msg: &[u8]) -> Vec<u8> {
        Keccak256::digest(msg).to_vec()
    }

    fn sign(&self, private_key: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
        check_private_key_len(private_key)?;
        let secret = SecretKey::from_slice(private_key)
            .map_err(|e| ScriptError::Crypto(format!("invalid secp256k1 private key: {}", e)))?;
        let sig = self.secp.sign_ecdsa(&Self::digest(msg), &secret);
        Ok(sig.serialize_der().to_vec())
    }

    fn verify(&self, pub_key: &[u8], signature: &[u8], msg: &[u8]) -> bool {
        if !der::is_strict_der(signature) {
            return false;
        }
        let pub_key = match PublicKey::from_slice(pub_key) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        let sig = match Signature::from_der(signature) {
            Ok(sig) => sig,
            Err(_) => return false,
        };

        // S must be in the lower half of the curve order
        let mut normalized = sig;
        normalized.normalize_s();
        if normalized != sig {
            return false;
        }

        self.secp.verify_ecdsa(&Self::digest(msg), &sig, &pub_key).is_ok()
    }
}
