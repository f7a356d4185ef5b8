// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::Result;
use crate::primitives::Operation;
use crate::settings::MinerNetSettings;

/// One block in the graph. The genesis block is a configured hash string
/// only; no `Block` value exists for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Hash of the previous block, or the genesis hash.
    pub prev: String,
    /// Depth-ordered block number, genesis being 0.
    pub block_num: u64,
    /// Operations committed by this block, in order.
    pub records: Vec<Operation>,
    /// Hex-encoded public key of the miner that sealed this block.
    pub miner: String,
    pub nonce: u32,
}

impl Block {
    /// Content hash with the nonce zeroed. Precomputed once per candidate
    /// so the nonce search only rehashes the nonce application.
    pub fn hash_no_nonce(&self) -> Result<String> {
        let mut unsealed = self.clone();
        unsealed.nonce = 0;
        codec::content_hash(&unsealed)
    }

    /// Applies a nonce to a precomputed no-nonce hash.
    pub fn hash_with_nonce(no_nonce_hash: &str, nonce: u32) -> String {
        let mut bytes = Vec::with_capacity(no_nonce_hash.len() + 4);
        bytes.extend_from_slice(no_nonce_hash.as_bytes());
        bytes.extend_from_slice(&nonce.to_le_bytes());
        codec::hash_bytes(&bytes)
    }

    /// The block's identity.
    pub fn hash(&self) -> Result<String> {
        Ok(Self::hash_with_nonce(&self.hash_no_nonce()?, self.nonce))
    }

    /// Difficulty class for this block: op blocks carry records, no-op
    /// blocks do not.
    pub fn required_difficulty(&self, settings: &MinerNetSettings) -> u8 {
        if self.records.is_empty() {
            settings.pow_difficulty_no_op_block
        } else {
            settings.pow_difficulty_op_block
        }
    }

    /// Whether this block's nonce satisfies its difficulty class: the
    /// hash must end in exactly the required number of zero hex chars.
    pub fn nonce_is_valid(&self, settings: &MinerNetSettings) -> Result<bool> {
        Ok(trailing_zeros(&self.hash()?) == self.required_difficulty(settings))
    }
}

/// Number of trailing `'0'` characters in a hex hash.
pub fn trailing_zeros(hash: &str) -> u8 {
    hash.bytes().rev().take_while(|b| *b == b'0').count() as u8
}
