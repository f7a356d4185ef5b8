// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::crypto::{self, Keypair};
use crate::error::Result;
use crate::primitives::Shape;

/// What an operation does to the canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OpKind {
    /// Commits a new shape, debiting the submitter's ink.
    #[serde(rename = "ADD")]
    Add { shape: Shape },
    /// Removes a previously committed shape, refunding its ink cost.
    #[serde(rename = "DELETE")]
    Delete { shape_hash: String },
}

/// A canvas mutation signed by the submitting key. Operations are built
/// once and never mutated; their identity is the content hash with the
/// signature field zeroed, and the signature covers that hash's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OpKind,
    /// Nanosecond creation timestamp. Distinguishes otherwise identical
    /// submissions from the same key.
    pub issued_at: u64,
    /// Hex-encoded public key of the submitter.
    pub pub_key: String,
    /// Hex-encoded (r, s) signature, empty while unsigned.
    pub sig: String,
    /// Number of descendant blocks that must extend the committing block
    /// before the submitting client call returns.
    pub validate_num: u8,
}

impl Operation {
    /// Builds and signs an operation with the current time as its id.
    pub fn build(kind: OpKind, keys: &Keypair, validate_num: u8) -> Result<Operation> {
        let issued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let mut op = Operation {
            kind,
            issued_at,
            pub_key: keys.public_hex().to_owned(),
            sig: String::new(),
            validate_num,
        };
        op.sig = keys.sign(op.hash()?.as_bytes());
        Ok(op)
    }

    /// Content hash identifying this operation, computed with the
    /// signature zeroed.
    pub fn hash(&self) -> Result<String> {
        let mut unsigned = self.clone();
        unsigned.sig = String::new();
        codec::content_hash(&unsigned)
    }

    /// Whether the signature covers this operation's hash under the
    /// submitter's key.
    pub fn verify_sig(&self) -> Result<bool> {
        let hash = self.hash()?;
        Ok(crypto::verify(hash.as_bytes(), &self.pub_key, &self.sig))
    }

    pub fn shape(&self) -> Option<&Shape> {
        match &self.kind {
            OpKind::Add { shape } => Some(shape),
            OpKind::Delete { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_keypair;

    fn add_op(keys: &Keypair) -> Operation {
        Operation::build(
            OpKind::Add {
                shape: Shape::new("M 0 10 H 20", "transparent", "red"),
            },
            keys,
            2,
        )
        .unwrap()
    }

    #[test]
    fn hash_ignores_the_signature_field() {
        let keys = test_keypair(1);
        let op = add_op(&keys);
        let mut unsigned = op.clone();
        unsigned.sig = String::new();
        assert_eq!(op.hash().unwrap(), unsigned.hash().unwrap());
    }

    #[test]
    fn hash_covers_every_other_field() {
        let keys = test_keypair(1);
        let op = add_op(&keys);
        let mut altered = op.clone();
        altered.validate_num = 3;
        assert_ne!(op.hash().unwrap(), altered.hash().unwrap());
        let mut altered = op.clone();
        altered.issued_at += 1;
        assert_ne!(op.hash().unwrap(), altered.hash().unwrap());
    }

    #[test]
    fn built_operations_verify() {
        let keys = test_keypair(2);
        assert!(add_op(&keys).verify_sig().unwrap());
    }

    #[test]
    fn mutation_invalidates_the_signature() {
        let keys = test_keypair(2);
        let mut op = add_op(&keys);
        op.kind = OpKind::Delete {
            shape_hash: "00".to_owned(),
        };
        assert!(!op.verify_sig().unwrap());
    }

    #[test]
    fn foreign_signature_does_not_verify() {
        let keys = test_keypair(2);
        let other = test_keypair(3);
        let mut op = add_op(&keys);
        op.pub_key = other.public_hex().to_owned();
        assert!(!op.verify_sig().unwrap());
    }

    #[test]
    fn kind_serializes_with_wire_tags() {
        let keys = test_keypair(1);
        let json = serde_json::to_string(&add_op(&keys)).unwrap();
        assert!(json.contains(r#""type":"ADD""#));
    }
}
