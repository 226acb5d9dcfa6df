//! NIST P-256 / SHA-256 backend

use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use super::{check_private_key_len, der, sealed, CryptoAlgorithm, CryptoBackend};
use crate::error::{Result, ScriptError};

/// P-256 ECDSA over SHA-256 digests, uncompressed 65-byte public keys
#[derive(Debug, Default, Clone, Copy)]
pub struct P256Backend;

impl P256Backend {
    fn signing_key(private_key: &[u8]) -> Result<SigningKey> {
        check_private_key_len(private_key)?;
        SigningKey::from_slice(private_key)
            .map_err(|e| ScriptError::Crypto(format!("invalid p256 private key: {}", e)))
    }
}

impl sealed::Sealed for P256Backend {}

impl CryptoBackend for P256Backend {
    fn algorithm(&self) -> CryptoAlgorithm {
        CryptoAlgorithm::P256
    }

    fn key_gen(&self) -> Result<Vec<u8>> {
        Ok(SecretKey::random(&mut OsRng).to_bytes().to_vec())
    }

    fn private_key_to_pub_key(&self, private_key: &[u8]) -> Result<Vec<u8>> {
        let signing_key = Self::signing_key(private_key)?;
        let public = PublicKey::from(signing_key.verifying_key());
        Ok(public.to_encoded_point(false).as_bytes().to_vec())
    }

    fn hash(&self, msg: &[u8]) -> Vec<u8> {
        Sha256::digest(msg).to_vec()
    }

    fn sign(&self, private_key: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
        let signing_key = Self::signing_key(private_key)?;
        let digest = Sha256::digest(msg);
        let sig: Signature = signing_key
            .sign_prehash(&digest)
            .map_err(|e| ScriptError::Crypto(format!("p256 signing failed: {}", e)))?;
        let bytes = sig.to_bytes();
        Ok(der::encode(&bytes[..32], &bytes[32..]))
    }

    fn verify(&self, pub_key: &[u8], signature: &[u8], msg: &[u8]) -> bool {
        let (r, s) = match der::decode(signature) {
            Some(rs) => rs,
            None => return false,
        };
        let verifying_key = match VerifyingKey::from_sec1_bytes(pub_key) {
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
        let digest = Sha256::digest(msg);
        verifying_key.verify_prehash(&digest, &sig).is_ok()
    }
}
