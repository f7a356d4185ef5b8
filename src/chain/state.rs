// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Deterministic canvas state derivation: a pure transform from a state
//! and a block to the next state, plus the memoizing replay that walks
//! the graph back to a cached ancestor or genesis.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chain::BlockGraph;
use crate::error::{Error, Result};
use crate::geometry;
use crate::primitives::{Block, OpKind, Shape};
use crate::settings::MinerNetSettings;

/// The canvas as of one block: ink balances per key, living shapes and
/// their owners, white tombstones of deleted shapes, and the set of
/// committed operations with their depth since commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasState {
    pub block_num: u64,
    pub ink_levels: HashMap<String, u32>,
    /// Keyed by the hash of the operation that wrote the entry: living
    /// shapes under their ADD hash, tombstones under the DELETE hash.
    pub shapes: HashMap<String, Shape>,
    /// Living shapes only.
    pub shape_owners: HashMap<String, String>,
    /// Operation hash to number of blocks mined since its commit.
    pub committed: HashMap<String, u64>,
}

impl CanvasState {
    pub fn new() -> Self {
        CanvasState::default()
    }

    pub fn ink_of(&self, pub_key: &str) -> u32 {
        self.ink_levels.get(pub_key).copied().unwrap_or(0)
    }
}

/// Applies a block to a state. Pure: the result depends only on the
/// arguments, and the input state is never modified.
pub fn transform(
    prev: &CanvasState,
    block: &Block,
    settings: &MinerNetSettings,
) -> Result<CanvasState> {
    let mut next = prev.clone();

    next.block_num += 1;
    if next.block_num != block.block_num {
        return Err(Error::Internal(format!(
            "expected block number {}, got {}",
            next.block_num, block.block_num
        )));
    }

    for age in next.committed.values_mut() {
        *age += 1;
    }

    for op in &block.records {
        let op_hash = op.hash()?;
        if next.committed.contains_key(&op_hash) {
            return Err(Error::Internal(format!(
                "operation {op_hash} is already committed on this chain"
            )));
        }

        match &op.kind {
            OpKind::Add { shape } => {
                geometry::validate_shape(shape, &settings.canvas_settings)?;
                let cost = geometry::ink_cost(shape)?;

                let balance = next.ink_of(&op.pub_key);
                if balance < cost {
                    return Err(Error::InsufficientInk(balance));
                }

                // A new shape may not conflict with any living shape,
                // the submitter's own included.
                for other_hash in next.shape_owners.keys() {
                    let other = &next.shapes[other_hash];
                    if geometry::shapes_overlap(other, shape)? {
                        return Err(Error::ShapeOverlap(other_hash.clone()));
                    }
                }

                *next.ink_levels.entry(op.pub_key.clone()).or_insert(0) = balance - cost;
                next.shapes.insert(op_hash.clone(), shape.clone());
                next.shape_owners.insert(op_hash.clone(), op.pub_key.clone());
            }
            OpKind::Delete { shape_hash } => {
                match next.shape_owners.get(shape_hash) {
                    Some(owner) if *owner == op.pub_key => {}
                    _ => return Err(Error::ShapeOwner(shape_hash.clone())),
                }
                let shape = next
                    .shapes
                    .get(shape_hash)
                    .cloned()
                    .ok_or_else(|| Error::ShapeOwner(shape_hash.clone()))?;

                let refund = geometry::ink_cost(&shape)?;
                *next.ink_levels.entry(op.pub_key.clone()).or_insert(0) += refund;

                next.shape_owners.remove(shape_hash);
                next.shapes.remove(shape_hash);
                next.shapes.insert(op_hash.clone(), shape.tombstone());
            }
        }

        next.committed.insert(op_hash, 0);
    }

    let reward = if block.records.is_empty() {
        settings.ink_per_no_op_block
    } else {
        settings.ink_per_op_block
    };
    *next.ink_levels.entry(block.miner.clone()).or_insert(0) += reward;

    Ok(next)
}

/// Lazily derived states keyed by block hash.
#[derive(Debug, Default)]
pub struct StateCache {
    states: HashMap<String, CanvasState>,
}

impl StateCache {
    pub fn new() -> Self {
        StateCache::default()
    }

    pub fn get(&self, block_hash: &str) -> Option<&CanvasState> {
        self.states.get(block_hash)
    }

    pub fn insert(&mut self, block_hash: String, state: CanvasState) {
        self.states.insert(block_hash, state);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CanvasState)> {
        self.states.iter()
    }
}

/// Walks back along `prev` links from the given block until a cached
/// state or genesis, returning the base state and the uncached blocks to
/// replay oldest-first. Errs if the ancestry is incomplete.
pub fn collect_worklist(
    graph: &BlockGraph,
    cache: &StateCache,
    block_hash: &str,
) -> Result<(CanvasState, Vec<(String, Block)>)> {
    let mut work = Vec::new();
    let mut cursor = block_hash.to_owned();
    let base = loop {
        if cursor == graph.genesis() {
            break CanvasState::new();
        }
        if let Some(state) = cache.get(&cursor) {
            break state.clone();
        }
        let block = graph
            .get(&cursor)
            .ok_or_else(|| Error::InvalidBlockHash(cursor.clone()))?;
        work.push((cursor.clone(), block.clone()));
        cursor = block.prev.clone();
    };
    work.reverse();
    Ok((base, work))
}

/// Replays the chain ending at `block_hash`, memoizing every
/// intermediate state.
pub fn state_for(
    graph: &BlockGraph,
    cache: &mut StateCache,
    settings: &MinerNetSettings,
    block_hash: &str,
) -> Result<CanvasState> {
    let (mut state, work) = collect_worklist(graph, cache, block_hash)?;
    for (hash, block) in work {
        state = transform(&state, &block, settings)?;
        cache.insert(hash, state.clone());
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{test_keypair, Keypair};
    use crate::primitives::Operation;
    use crate::settings::CanvasSettings;

    fn settings() -> MinerNetSettings {
        MinerNetSettings {
            genesis_block_hash: "genesis".to_owned(),
            min_num_miner_connections: 1,
            ink_per_op_block: 50,
            ink_per_no_op_block: 100,
            heart_beat: 1000,
            pow_difficulty_op_block: 2,
            pow_difficulty_no_op_block: 1,
            canvas_settings: CanvasSettings {
                canvas_x_max: 1024,
                canvas_y_max: 1024,
            },
        }
    }

    fn add_op(keys: &Keypair, svg: &str) -> Operation {
        Operation::build(
            OpKind::Add {
                shape: Shape::new(svg, "transparent", "red"),
            },
            keys,
            1,
        )
        .unwrap()
    }

    fn delete_op(keys: &Keypair, shape_hash: &str) -> Operation {
        Operation::build(
            OpKind::Delete {
                shape_hash: shape_hash.to_owned(),
            },
            keys,
            1,
        )
        .unwrap()
    }

    fn noop_block(prev: &str, block_num: u64, miner: &str) -> Block {
        Block {
            prev: prev.to_owned(),
            block_num,
            records: vec![],
            miner: miner.to_owned(),
            nonce: 0,
        }
    }

    /// A state with enough mined ink for one key to draw with.
    fn funded_state(keys: &Keypair) -> (CanvasState, MinerNetSettings) {
        let settings = settings();
        let genesis = CanvasState::new();
        let block = noop_block("genesis", 1, keys.public_hex());
        let state = transform(&genesis, &block, &settings).unwrap();
        (state, settings)
    }

    #[test]
    fn noop_blocks_pay_the_noop_reward() {
        let keys = test_keypair(1);
        let (state, settings) = funded_state(&keys);
        assert_eq!(state.ink_of(keys.public_hex()), settings.ink_per_no_op_block);
        assert_eq!(state.block_num, 1);
    }

    #[test]
    fn transform_is_pure() {
        let keys = test_keypair(1);
        let (state, settings) = funded_state(&keys);
        let mut block = noop_block("a", 2, keys.public_hex());
        block.records.push(add_op(&keys, "M 0 10 H 20"));

        let once = transform(&state, &block, &settings).unwrap();
        let twice = transform(&state, &block, &settings).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn add_debits_cost_and_rewards_the_miner() {
        let keys = test_keypair(1);
        let (state, settings) = funded_state(&keys);
        let op = add_op(&keys, "M 0 10 H 20");
        let op_hash = op.hash().unwrap();
        let mut block = noop_block("a", 2, keys.public_hex());
        block.records.push(op);

        let next = transform(&state, &block, &settings).unwrap();
        // One key mines and draws: reward minus the 20-unit line.
        assert_eq!(
            next.ink_of(keys.public_hex()),
            settings.ink_per_no_op_block + settings.ink_per_op_block - 20
        );
        assert_eq!(next.shape_owners[&op_hash], keys.public_hex());
        assert_eq!(next.committed[&op_hash], 0);
    }

    #[test]
    fn delete_refunds_and_leaves_a_white_tombstone() {
        let keys = test_keypair(1);
        let (state, settings) = funded_state(&keys);
        let add = add_op(&keys, "M 0 10 H 20");
        let add_hash = add.hash().unwrap();
        let mut block2 = noop_block("a", 2, keys.public_hex());
        block2.records.push(add);
        let after_add = transform(&state, &block2, &settings).unwrap();

        let del = delete_op(&keys, &add_hash);
        let del_hash = del.hash().unwrap();
        let mut block3 = noop_block("b", 3, keys.public_hex());
        block3.records.push(del);
        let after_del = transform(&after_add, &block3, &settings).unwrap();

        assert_eq!(
            after_del.ink_of(keys.public_hex()),
            after_add.ink_of(keys.public_hex()) + 20 + settings.ink_per_op_block
        );
        assert!(!after_del.shape_owners.contains_key(&add_hash));
        assert!(!after_del.shapes.contains_key(&add_hash));
        let tomb = &after_del.shapes[&del_hash];
        assert_eq!(tomb.stroke, "white");
        assert_eq!(tomb.fill, "transparent");
    }

    #[test]
    fn delete_by_non_owner_is_rejected() {
        let keys = test_keypair(1);
        let intruder = test_keypair(2);
        let (state, settings) = funded_state(&keys);
        let add = add_op(&keys, "M 0 10 H 20");
        let add_hash = add.hash().unwrap();
        let mut block2 = noop_block("a", 2, keys.public_hex());
        block2.records.push(add);
        let after_add = transform(&state, &block2, &settings).unwrap();

        let mut block3 = noop_block("b", 3, keys.public_hex());
        block3.records.push(delete_op(&intruder, &add_hash));
        assert!(matches!(
            transform(&after_add, &block3, &settings),
            Err(Error::ShapeOwner(_))
        ));
    }

    #[test]
    fn delete_of_unknown_shape_is_rejected() {
        let keys = test_keypair(1);
        let (state, settings) = funded_state(&keys);
        let mut block = noop_block("a", 2, keys.public_hex());
        block.records.push(delete_op(&keys, "no-such-shape"));
        assert!(matches!(
            transform(&state, &block, &settings),
            Err(Error::ShapeOwner(_))
        ));
    }

    #[test]
    fn unaffordable_add_is_rejected_with_the_balance() {
        let keys = test_keypair(1);
        let settings = settings();
        let mut block = noop_block("genesis", 1, keys.public_hex());
        block.records.push(add_op(&keys, "M 0 10 H 20"));
        // Fresh key, no mining history: balance 0.
        assert_eq!(
            transform(&CanvasState::new(), &block, &settings),
            Err(Error::InsufficientInk(0))
        );
    }

    #[test]
    fn overlapping_add_is_rejected_even_for_the_same_owner() {
        let keys = test_keypair(1);
        let (state, settings) = funded_state(&keys);
        let first = add_op(&keys, "M 0 10 H 20");
        let first_hash = first.hash().unwrap();
        let mut block2 = noop_block("a", 2, keys.public_hex());
        block2.records.push(first);
        let after_first = transform(&state, &block2, &settings).unwrap();

        let mut block3 = noop_block("b", 3, keys.public_hex());
        block3.records.push(add_op(&keys, "M 10 0 V 20"));
        assert_eq!(
            transform(&after_first, &block3, &settings),
            Err(Error::ShapeOverlap(first_hash))
        );
    }

    #[test]
    fn an_operation_cannot_commit_twice_along_one_chain() {
        let keys = test_keypair(1);
        let (state, settings) = funded_state(&keys);
        let op = add_op(&keys, "M 0 10 H 20");
        let mut block2 = noop_block("a", 2, keys.public_hex());
        block2.records.push(op.clone());
        let after = transform(&state, &block2, &settings).unwrap();

        let mut block3 = noop_block("b", 3, keys.public_hex());
        block3.records.push(op);
        assert!(transform(&after, &block3, &settings).is_err());
    }

    #[test]
    fn block_number_must_follow_the_state() {
        let keys = test_keypair(1);
        let (state, settings) = funded_state(&keys);
        let block = noop_block("a", 7, keys.public_hex());
        assert!(transform(&state, &block, &settings).is_err());
    }

    #[test]
    fn committed_ages_advance_each_block() {
        let keys = test_keypair(1);
        let (state, settings) = funded_state(&keys);
        let op = add_op(&keys, "M 0 10 H 20");
        let op_hash = op.hash().unwrap();
        let mut block2 = noop_block("a", 2, keys.public_hex());
        block2.records.push(op);
        let mut state = transform(&state, &block2, &settings).unwrap();
        assert_eq!(state.committed[&op_hash], 0);

        for (i, prev) in [("b", 3u64), ("c", 4)].iter().enumerate() {
            state = transform(&state, &noop_block(prev.0, prev.1, keys.public_hex()), &settings)
                .unwrap();
            assert_eq!(state.committed[&op_hash], i as u64 + 1);
        }
    }

    #[test]
    fn ink_deltas_balance_per_block() {
        let keys = test_keypair(1);
        let (state, settings) = funded_state(&keys);
        let op = add_op(&keys, "M 0 10 H 20");
        let mut block = noop_block("a", 2, keys.public_hex());
        block.records.push(op);
        let next = transform(&state, &block, &settings).unwrap();

        let total_before: i64 = state.ink_levels.values().map(|v| i64::from(*v)).sum();
        let total_after: i64 = next.ink_levels.values().map(|v| i64::from(*v)).sum();
        // reward - add cost, no refunds in this block
        assert_eq!(
            total_after - total_before,
            i64::from(settings.ink_per_op_block) - 20
        );
    }

    #[test]
    fn replay_memoizes_every_intermediate_state() {
        let keys = test_keypair(1);
        let settings = settings();
        let mut graph = BlockGraph::new("genesis");
        let mut cache = StateCache::new();

        let b1 = noop_block("genesis", 1, keys.public_hex());
        let h1 = b1.hash().unwrap();
        let b2 = noop_block(&h1, 2, keys.public_hex());
        let h2 = b2.hash().unwrap();
        graph.insert(h1.clone(), b1);
        graph.insert(h2.clone(), b2);

        let state = state_for(&graph, &mut cache, &settings, &h2).unwrap();
        assert_eq!(
            state.ink_of(keys.public_hex()),
            settings.ink_per_no_op_block * 2
        );
        assert!(cache.get(&h1).is_some());
        assert!(cache.get(&h2).is_some());
        assert_eq!(
            cache.get(&h1).unwrap().ink_of(keys.public_hex()),
            settings.ink_per_no_op_block
        );
    }

    #[test]
    fn replay_errors_on_missing_ancestry() {
        let settings = settings();
        let graph = BlockGraph::new("genesis");
        let mut cache = StateCache::new();
        assert!(matches!(
            state_for(&graph, &mut cache, &settings, "unknown"),
            Err(Error::InvalidBlockHash(_))
        ));
    }
}
