// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! ECDSA P-256 key handling and the signing primitive the core consumes:
//! `sign(bytes) -> sig`, `verify(bytes, key, sig) -> bool`. Public keys
//! travel through the system as hex-encoded compressed SEC1 points; key
//! files on disk are PEM.

use std::fs;
use std::path::Path;

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use p256::{PublicKey, SecretKey};

use crate::error::{Error, Result};

/// A miner's key pair, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Keypair {
    signing: SigningKey,
    public_hex: String,
}

impl Keypair {
    pub fn new(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Keypair {
            signing: SigningKey::from(secret),
            public_hex: encode_public(&public),
        }
    }

    /// Loads a key pair from PEM files, accepting both PKCS#8 and SEC1
    /// private key encodings. The public key file must match the private
    /// key.
    pub fn load(public_path: &Path, private_path: &Path) -> Result<Self> {
        let public_pem = fs::read_to_string(public_path)
            .map_err(|e| Error::Internal(format!("read {}: {e}", public_path.display())))?;
        let private_pem = fs::read_to_string(private_path)
            .map_err(|e| Error::Internal(format!("read {}: {e}", private_path.display())))?;

        let public = PublicKey::from_public_key_pem(&public_pem)
            .map_err(|e| Error::Internal(format!("parse public key: {e}")))?;
        let secret = SecretKey::from_pkcs8_pem(&private_pem)
            .or_else(|_| SecretKey::from_sec1_pem(&private_pem))
            .map_err(|e| Error::Internal(format!("parse private key: {e}")))?;

        if secret.public_key() != public {
            return Err(Error::Internal(
                "public key file does not match private key file".to_owned(),
            ));
        }

        Ok(Keypair::new(secret))
    }

    /// Hex-encoded compressed SEC1 point identifying this key pair.
    pub fn public_hex(&self) -> &str {
        &self.public_hex
    }

    /// Signs raw bytes, returning the hex encoding of the fixed-size
    /// (r, s) signature.
    pub fn sign(&self, bytes: &[u8]) -> String {
        let sig: Signature = self.signing.sign(bytes);
        hex::encode(sig.to_bytes())
    }
}

/// Hex-encoded compressed SEC1 encoding of a public key.
pub fn encode_public(key: &PublicKey) -> String {
    hex::encode(key.to_encoded_point(true).as_bytes())
}

/// Verifies a hex signature over raw bytes against a hex-encoded public
/// key. Any malformed input verifies false.
pub fn verify(bytes: &[u8], public_hex: &str, sig_hex: &str) -> bool {
    let Ok(point) = hex::decode(public_hex) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_sec1_bytes(&point) else {
        return false;
    };
    let Ok(raw) = hex::decode(sig_hex) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(&raw) else {
        return false;
    };
    key.verify(bytes, &sig).is_ok()
}

/// Generates a fresh key pair and returns `(public_pem, private_pem)`.
pub fn generate_pem_pair() -> Result<(String, String)> {
    let secret = SecretKey::random(&mut rand::rngs::OsRng);
    let public_pem = secret
        .public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(Error::internal)?;
    let private_pem = secret.to_sec1_pem(LineEnding::LF).map_err(Error::internal)?;
    Ok((public_pem, private_pem.to_string()))
}

#[cfg(test)]
pub(crate) fn test_keypair(seed: u8) -> Keypair {
    // Deterministic non-zero scalar, fine for tests only.
    let mut bytes = [0u8; 32];
    bytes[31] = seed.max(1);
    Keypair::new(SecretKey::from_slice(&bytes).unwrap())
}
