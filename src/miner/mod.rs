// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! The mining loop: a candidate assembler that rebuilds a block from the
//! mempool whenever work arrives, and a nonce searcher that hammers the
//! candidate in bounded batches, dropping it the moment a fresher one
//! lands.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::chain;
use crate::error::Result;
use crate::node::Miner;
use crate::primitives::{trailing_zeros, Block, Operation};

/// Nonce attempts between interruption polls.
const BATCH_SIZE: u32 = 1_000;

/// Tries `iterations` nonces following `start`. Returns the last nonce
/// tried and the hit, if any. A hit's hash carries exactly the required
/// trailing-zero count.
pub fn search_nonce(
    no_nonce_hash: &str,
    difficulty: u8,
    start: u32,
    iterations: u32,
) -> (u32, Option<u32>) {
    let mut nonce = start;
    for _ in 0..iterations {
        nonce = nonce.wrapping_add(1);
        let hash = Block::hash_with_nonce(no_nonce_hash, nonce);
        if trailing_zeros(&hash) == difficulty {
            return (nonce, Some(nonce));
        }
    }
    (nonce, None)
}

/// Builds the next candidate on top of the longest chain: every mempool
/// operation that transforms cleanly is included; the first failure per
/// operation is recorded so a permanently stuck operation eventually
/// fails its waiter.
pub(crate) fn assemble_candidate(node: &Arc<Miner>) -> Result<Block> {
    let tip = {
        let inner = node.mu.lock();
        inner.graph.longest_tip().0
    };
    let state = node.derive_state(&tip)?;

    let mut block = Block {
        prev: tip,
        block_num: state.block_num + 1,
        records: vec![],
        miner: node.keys().public_hex().to_owned(),
        nonce: 0,
    };

    let mempool: Vec<(String, Operation)> = {
        let inner = node.mu.lock();
        inner
            .mempool
            .iter()
            .map(|(hash, op)| (hash.clone(), op.clone()))
            .collect()
    };

    for (op_hash, op) in mempool {
        if state.committed.contains_key(&op_hash) {
            continue;
        }

        let first_failure = {
            let inner = node.mu.lock();
            inner.op_errors.get(&op_hash).cloned()
        };
        if let Some(failure) = first_failure {
            if failure.block_num + u64::from(op.validate_num) < block.block_num {
                node.fail_waiter(&op_hash, failure.err);
                continue;
            }
        }

        block.records.push(op);
        if let Err(err) = chain::transform(&state, &block, node.settings()) {
            debug!(op = %op_hash, %err, "operation does not fit the candidate");
            block.records.pop();
            let mut inner = node.mu.lock();
            inner
                .op_errors
                .entry(op_hash)
                .or_insert(crate::node::waiters::OpError {
                    block_num: block.block_num,
                    err,
                });
        }
    }

    Ok(block)
}

/// Spawns the assembler and searcher tasks. Both stop with the node.
pub fn spawn(node: Arc<Miner>) {
    let (candidate_tx, candidate_rx) = watch::channel::<Option<Block>>(None);
    tokio::spawn(assemble_loop(node.clone(), candidate_tx));
    tokio::spawn(search_loop(node, candidate_rx));
}

async fn assemble_loop(node: Arc<Miner>, candidate_tx: watch::Sender<Option<Block>>) {
    loop {
        if let Some(delay) = node.config().block_delay {
            tokio::time::sleep(delay).await;
        }
        if node.stopper().is_stopped() {
            return;
        }

        match assemble_candidate(&node) {
            Ok(block) => {
                debug!(
                    num = block.block_num,
                    records = block.records.len(),
                    "candidate assembled"
                );
                // Single-slot: a fresh candidate displaces a stale one.
                let _ = candidate_tx.send(Some(block));
            }
            Err(err) => warn!(%err, "candidate assembly failed"),
        }

        tokio::select! {
            _ = node.work.notified() => {}
            _ = node.stopper().stopped() => return,
        }
    }
}

async fn search_loop(node: Arc<Miner>, mut candidate_rx: watch::Receiver<Option<Block>>) {
    loop {
        tokio::select! {
            changed = candidate_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = node.stopper().stopped() => return,
        }
        let Some(mut block) = candidate_rx.borrow_and_update().clone() else {
            continue;
        };

        let difficulty = block.required_difficulty(node.settings());
        let no_nonce = match block.hash_no_nonce() {
            Ok(hash) => hash,
            Err(err) => {
                warn!(%err, "candidate cannot be hashed");
                continue;
            }
        };

        let mut nonce: u32 = rand::random();
        loop {
            let (next, found) = search_nonce(&no_nonce, difficulty, nonce, BATCH_SIZE);
            nonce = next;

            if let Some(hit) = found {
                block.nonce = hit;
                match node.accept_block(block.clone()) {
                    Ok(_) => info!(num = block.block_num, nonce = hit, "block sealed"),
                    Err(err) => warn!(%err, "sealed block was refused"),
                }
                break;
            }

            if node.stopper().is_stopped() {
                return;
            }
            // A fresher candidate obsoletes this one mid-search.
            if candidate_rx.has_changed().unwrap_or(true) {
                break;
            }
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_finds_a_nonce_for_a_small_difficulty() {
        let block = Block {
            prev: "genesis".to_owned(),
            block_num: 1,
            records: vec![],
            miner: "00".to_owned(),
            nonce: 0,
        };
        let no_nonce = block.hash_no_nonce().unwrap();
        let (_, found) = search_nonce(&no_nonce, 1, 0, 100_000);
        let nonce = found.expect("a difficulty-1 nonce within the batch");
        let hash = Block::hash_with_nonce(&no_nonce, nonce);
        assert_eq!(trailing_zeros(&hash), 1);
    }

    #[test]
    fn search_reports_exhaustion() {
        let block = Block {
            prev: "genesis".to_owned(),
            block_num: 1,
            records: vec![],
            miner: "00".to_owned(),
            nonce: 0,
        };
        let no_nonce = block.hash_no_nonce().unwrap();
        // Sixteen trailing zeros will not appear in a couple of tries.
        let (last, found) = search_nonce(&no_nonce, 16, 10, 2);
        assert_eq!(found, None);
        assert_eq!(last, 12);
    }
}
