// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Canonical byte encoding used under content hashes and signatures.
//!
//! Both the signer and every verifier must serialize a value to the exact
//! same bytes or signatures will not round-trip. We fix the canonical form
//! to the JSON encoding of the value: struct fields serialize in
//! declaration order, map fields are not used in hashed values, and the
//! zeroed-field convention (empty signature, zero nonce) is applied by the
//! caller before encoding.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Encodes a value to its canonical byte form.
pub fn encode_to_vec<T: Serialize>(val: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(val).map_err(Error::internal)
}

/// Hex-encoded SHA-256 over the canonical encoding of `val`.
pub fn content_hash<T: Serialize>(val: &T) -> Result<String> {
    Ok(hash_bytes(&encode_to_vec(val)?))
}

/// Hex-encoded SHA-256 over raw bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
