//! SM2 / SM3 backend

use rand::rngs::OsRng;
use sm2::dsa::signature::{Signer, Verifier};
use sm2::dsa::{Signature, SigningKey, VerifyingKey};
use sm2::elliptic_curve::sec1::ToEncodedPoint;
use sm2::SecretKey;
use sm3::{Digest, Sm3};

use super::{check_private_key_len, der, sealed, CryptoAlgorithm, CryptoBackend};
use crate::constants::SM2_DEFAULT_DISTID;
use crate::error::{Result, ScriptError};

/// SM2 signatures with compressed 33-byte public keys.
///
/// Signing hashes `Z_A || msg` with SM3, where `Z_A` binds the signer's
/// public key and the default distinguishing ID.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sm2Backend;

impl Sm2Backend {
    fn secret_key(private_key: &[u8]) -> Result<SecretKey> {
        check_private_key_len(private_key)?;
        SecretKey::from_slice(private_key)
            .map_err(|e| ScriptError::Crypto(format!("invalid sm2 private key: {}", e)))
    }
}

impl sealed::Sealed for Sm2Backend {}

impl CryptoBackend for Sm2Backend {
    fn algorithm(&self) -> CryptoAlgorithm {
        CryptoAlgorithm::Sm2
    }

    fn key_gen(&self) -> Result<Vec<u8>> {
        Ok(SecretKey::random(&mut OsRng).to_bytes().to_vec())
    }

    fn private_key_to_pub_key(&self, private_key: &[u8]) -> Result<Vec<u8>> {
        let secret = Self::secret_key(private_key)?;
        Ok(secret.public_key().to_encoded_point(true).as_bytes().to_vec())
    }

    fn hash(&self, msg: &[u8]) -> Vec<u8> {
        Sm3::digest(msg).to_vec()
    }

    fn sign(&self, private_key: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
        let secret = Self::secret_key(private_key)?;
        let signing_key = SigningKey::new(SM2_DEFAULT_DISTID, &secret)
            .map_err(|e| ScriptError::Crypto(format!("sm2 key setup failed: {}", e)))?;
        let sig: Signature = signing_key
            .try_sign(msg)
            .map_err(|e| ScriptError::Crypto(format!("sm2 signing failed: {}", e)))?;
        let bytes = sig.to_bytes();
        Ok(der::encode(&bytes[..32], &bytes[32..]))
    }

    fn verify(&self, pub_key: &[u8], signature: &[u8], msg: &[u8]) -> bool {
        let (r, s) = match der::decode(signature) {
            Some(rs) => rs,
            None => return false,
        };
        let verifying_key = match VerifyingKey::from_sec1_bytes(SM2_DEFAULT_DISTID, pub_key) {
            Ok(key) => key,
            Err(_) => return false,
        };
        let mut raw = [0u8; 64];
        raw[..32].copy_from_slice(&r);
        raw[32..].copy_from_slice(&s);
        let sig = match Signature::from_slice(&raw) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        verifying_key.verify(msg, &sig).is_ok()
    }
}
