// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! The block graph: a content-addressed append-only tree of blocks with
//! depth memoization and longest-chain selection.

mod state;

pub use state::{collect_worklist, state_for, transform, CanvasState, StateCache};

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Error, Result};
use crate::primitives::Block;

/// All blocks known to a miner, keyed by hash. The graph itself is plain
/// data; the owning node guards it with the miner-wide lock.
#[derive(Debug)]
pub struct BlockGraph {
    genesis: String,
    blocks: HashMap<String, Block>,
}

impl BlockGraph {
    pub fn new(genesis_hash: impl Into<String>) -> Self {
        BlockGraph {
            genesis: genesis_hash.into(),
            blocks: HashMap::new(),
        }
    }

    pub fn genesis(&self) -> &str {
        &self.genesis
    }

    /// Inserts a block under its hash. Returns false if the hash was
    /// already present; insertion is idempotent.
    pub fn insert(&mut self, hash: String, block: Block) -> bool {
        if self.blocks.contains_key(&hash) {
            return false;
        }
        self.blocks.insert(hash, block);
        true
    }

    pub fn get(&self, hash: &str) -> Option<&Block> {
        self.blocks.get(hash)
    }

    pub fn contains(&self, hash: &str) -> bool {
        hash == self.genesis || self.blocks.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn hashes(&self) -> impl Iterator<Item = &String> {
        self.blocks.keys()
    }

    /// Hashes of all blocks whose `prev` is the given hash.
    pub fn children(&self, hash: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .blocks
            .iter()
            .filter(|(_, block)| block.prev == hash)
            .map(|(child, _)| child.clone())
            .collect();
        out.sort();
        out
    }

    /// Distance from genesis, memoized into `memo` for repeated calls.
    /// Errs on a hash whose ancestry does not reach genesis.
    pub fn depth(&self, hash: &str, memo: &mut HashMap<String, u64>) -> Result<u64> {
        if hash == self.genesis {
            return Ok(0);
        }
        if let Some(depth) = memo.get(hash) {
            return Ok(*depth);
        }
        // Iterative walk: recursion depth would track chain length.
        let mut trail = Vec::new();
        let mut cursor = hash.to_owned();
        let base = loop {
            if cursor == self.genesis {
                break 0;
            }
            if let Some(depth) = memo.get(&cursor) {
                break *depth;
            }
            let block = self
                .blocks
                .get(&cursor)
                .ok_or_else(|| Error::InvalidBlockHash(cursor.clone()))?;
            trail.push(cursor.clone());
            cursor = block.prev.clone();
        };
        let mut depth = base;
        for h in trail.into_iter().rev() {
            depth += 1;
            memo.insert(h, depth);
        }
        Ok(depth)
    }

    /// The tip of the longest chain and its depth. Orphan blocks whose
    /// ancestry is incomplete are skipped. Equal-depth chains are broken
    /// deterministically in favour of the lowest hash; an empty graph
    /// yields the genesis hash at depth 0.
    pub fn longest_tip(&self) -> (String, u64) {
        let mut memo = HashMap::new();
        let mut best = (self.genesis.clone(), 0);
        for hash in self.blocks.keys() {
            let depth = match self.depth(hash, &mut memo) {
                Ok(depth) => depth,
                Err(err) => {
                    debug!(%hash, %err, "skipping block with incomplete ancestry");
                    continue;
                }
            };
            if depth > best.1 || (depth == best.1 && *hash < best.0) {
                best = (hash.clone(), depth);
            }
        }
        best
    }

    /// All resolvable blocks, shallowest first. Used to push history to a
    /// new peer so it can always find the parent before the child.
    pub fn blocks_by_depth(&self) -> Vec<(String, Block)> {
        let mut memo = HashMap::new();
        let mut out: Vec<(u64, String)> = self
            .blocks
            .keys()
            .filter_map(|hash| self.depth(hash, &mut memo).ok().map(|d| (d, hash.clone())))
            .collect();
        out.sort();
        out.into_iter()
            .map(|(_, hash)| {
                let block = self.blocks[&hash].clone();
                (hash, block)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(prev: &str, block_num: u64, nonce: u32) -> (String, Block) {
        let block = Block {
            prev: prev.to_owned(),
            block_num,
            records: vec![],
            miner: "00".to_owned(),
            nonce,
        };
        (block.hash().unwrap(), block)
    }

    #[test]
    fn longest_chain_prefers_depth() {
        // g -> a, g -> b, a -> c
        let mut graph = BlockGraph::new("g");
        let (a_hash, a) = block("g", 1, 1);
        let (b_hash, b) = block("g", 1, 2);
        let (c_hash, c) = block(&a_hash, 2, 3);
        graph.insert(a_hash.clone(), a);
        graph.insert(b_hash, b);
        graph.insert(c_hash.clone(), c);

        let (tip, depth) = graph.longest_tip();
        assert_eq!(tip, c_hash);
        assert_eq!(depth, 2);
    }

    #[test]
    fn equal_depth_ties_break_to_the_lowest_hash() {
        let mut graph = BlockGraph::new("g");
        let (a_hash, a) = block("g", 1, 1);
        let (b_hash, b) = block("g", 1, 2);
        graph.insert(a_hash.clone(), a);
        graph.insert(b_hash.clone(), b);

        let (tip, depth) = graph.longest_tip();
        assert_eq!(depth, 1);
        assert_eq!(tip, a_hash.min(b_hash));
    }

    #[test]
    fn arrival_order_does_not_change_the_selected_tip() {
        let (a_hash, a) = block("g", 1, 1);
        let (b_hash, b) = block("g", 1, 2);
        let (c_hash, c) = block(&b_hash, 2, 3);

        let mut forward = BlockGraph::new("g");
        forward.insert(a_hash.clone(), a.clone());
        forward.insert(b_hash.clone(), b.clone());
        forward.insert(c_hash.clone(), c.clone());

        let mut reversed = BlockGraph::new("g");
        reversed.insert(c_hash.clone(), c);
        reversed.insert(b_hash, b);
        reversed.insert(a_hash, a);

        assert_eq!(forward.longest_tip(), reversed.longest_tip());
    }

    #[test]
    fn depth_errors_on_dangling_ancestry() {
        let mut graph = BlockGraph::new("g");
        let (orphan_hash, orphan) = block("missing", 5, 1);
        graph.insert(orphan_hash.clone(), orphan);

        let mut memo = HashMap::new();
        assert!(matches!(
            graph.depth(&orphan_hash, &mut memo),
            Err(Error::InvalidBlockHash(_))
        ));
        // An orphan never wins the longest-chain scan.
        assert_eq!(graph.longest_tip(), ("g".to_owned(), 0));
    }

    #[test]
    fn insert_is_idempotent() {
        let mut graph = BlockGraph::new("g");
        let (hash, b) = block("g", 1, 1);
        assert!(graph.insert(hash.clone(), b.clone()));
        assert!(!graph.insert(hash, b));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn children_queries() {
        let mut graph = BlockGraph::new("g");
        let (a_hash, a) = block("g", 1, 1);
        let (b_hash, b) = block("g", 1, 2);
        let (c_hash, c) = block(&a_hash, 2, 3);
        graph.insert(a_hash.clone(), a);
        graph.insert(b_hash.clone(), b);
        graph.insert(c_hash.clone(), c);

        let mut roots = graph.children("g");
        roots.sort();
        let mut want = vec![a_hash.clone(), b_hash];
        want.sort();
        assert_eq!(roots, want);
        assert_eq!(graph.children(&a_hash), vec![c_hash.clone()]);
        assert!(graph.children(&c_hash).is_empty());
    }

    #[test]
    fn blocks_by_depth_is_shallowest_first() {
        let mut graph = BlockGraph::new("g");
        let (a_hash, a) = block("g", 1, 1);
        let (b_hash, b) = block(&a_hash, 2, 2);
        let (c_hash, c) = block(&b_hash, 3, 3);
        graph.insert(c_hash.clone(), c);
        graph.insert(a_hash.clone(), a);
        graph.insert(b_hash.clone(), b);

        let ordered: Vec<String> = graph
            .blocks_by_depth()
            .into_iter()
            .map(|(hash, _)| hash)
            .collect();
        assert_eq!(ordered, vec![a_hash, b_hash, c_hash]);
    }
}
