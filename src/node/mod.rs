// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! The miner node: one shared mutable core behind a single lock, with the
//! operations every other component calls into. Externally triggered
//! mutations take the lock briefly and release it before network I/O or
//! geometry and hashing work.

pub mod directory;
pub mod peers;
pub mod rpc;
pub(crate) mod waiters;

pub use peers::Peer;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{oneshot, watch, Notify};
use tracing::{debug, info, warn};

use crate::chain::{self, BlockGraph, CanvasState, StateCache};
use crate::crypto::Keypair;
use crate::error::{Error, Result};
use crate::geometry;
use crate::primitives::{Block, Operation, Shape};
use crate::settings::{MinerConfig, MinerNetSettings};
use waiters::{CommitWaiter, OpError};

/// Cooperative shutdown signal. Every long-running loop polls it between
/// iterations or selects on it.
#[derive(Debug, Clone)]
pub struct Stopper {
    tx: Arc<watch::Sender<bool>>,
}

impl Stopper {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Stopper { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `stop` has been called.
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for Stopper {
    fn default() -> Self {
        Stopper::new()
    }
}

/// Everything the miner mutates, guarded by one lock.
pub(crate) struct Inner {
    pub graph: BlockGraph,
    pub states: StateCache,
    pub mempool: HashMap<String, Operation>,
    pub peers: HashMap<String, Peer>,
    pub waiters: HashMap<String, CommitWaiter>,
    pub op_errors: HashMap<String, OpError>,
    pub head: String,
}

/// One miner. Shared as `Arc<Miner>` between the RPC surface, the mining
/// tasks, and the peer tasks.
pub struct Miner {
    settings: MinerNetSettings,
    config: MinerConfig,
    keys: Keypair,
    local_addr: RwLock<String>,
    pub(crate) mu: Mutex<Inner>,
    /// Wakes the candidate assembler on a new operation or block.
    pub(crate) work: Notify,
    stopper: Stopper,
}

impl Miner {
    pub fn new(settings: MinerNetSettings, config: MinerConfig, keys: Keypair) -> Arc<Miner> {
        let genesis = settings.genesis_block_hash.clone();
        Arc::new(Miner {
            settings,
            config,
            keys,
            local_addr: RwLock::new(String::new()),
            mu: Mutex::new(Inner {
                graph: BlockGraph::new(genesis.clone()),
                states: StateCache::new(),
                mempool: HashMap::new(),
                peers: HashMap::new(),
                waiters: HashMap::new(),
                op_errors: HashMap::new(),
                head: genesis,
            }),
            work: Notify::new(),
            stopper: Stopper::new(),
        })
    }

    pub fn settings(&self) -> &MinerNetSettings {
        &self.settings
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    pub fn keys(&self) -> &Keypair {
        &self.keys
    }

    pub fn stopper(&self) -> &Stopper {
        &self.stopper
    }

    pub fn local_addr(&self) -> String {
        self.local_addr.read().clone()
    }

    pub fn set_local_addr(&self, addr: String) {
        *self.local_addr.write() = addr;
    }

    /// Stops every loop, fails parked waiters, and drops peer handles.
    pub fn shutdown(&self) {
        self.stopper.stop();
        self.work.notify_one();
        let (waiters, peers) = {
            let mut inner = self.mu.lock();
            let waiters: Vec<CommitWaiter> =
                inner.waiters.drain().map(|(_, waiter)| waiter).collect();
            let peers: Vec<Peer> = inner.peers.drain().map(|(_, peer)| peer).collect();
            (waiters, peers)
        };
        for waiter in waiters {
            let _ = waiter.tx.send(Err(Error::Stopping));
        }
        drop(peers);
        info!("miner stopped");
    }

    /// Hash of the current longest-chain tip.
    pub fn head(&self) -> String {
        self.mu.lock().head.clone()
    }

    /// Canvas state at the current head.
    pub fn head_state(&self) -> Result<CanvasState> {
        let head = self.head();
        self.derive_state(&head)
    }

    /// Derives (and memoizes) the state at a block, replaying forward
    /// from the nearest cached ancestor. The lock is held while walking
    /// the graph but released around every transform.
    pub fn derive_state(&self, block_hash: &str) -> Result<CanvasState> {
        if block_hash == self.settings.genesis_block_hash {
            return Ok(CanvasState::new());
        }
        let (mut state, work) = {
            let inner = self.mu.lock();
            if let Some(state) = inner.states.get(block_hash) {
                return Ok(state.clone());
            }
            chain::collect_worklist(&inner.graph, &inner.states, block_hash)?
        };
        for (hash, block) in work {
            state = chain::transform(&state, &block, &self.settings)?;
            self.mu.lock().states.insert(hash, state.clone());
        }
        Ok(state)
    }

    /// Validates an operation and adds it to the mempool. A first-time
    /// ingestion wakes the assembler and floods the operation to peers.
    /// Returns false when the operation was already known.
    pub fn admit_operation(self: &Arc<Self>, op: &Operation) -> Result<bool> {
        if !op.verify_sig()? {
            return Err(Error::Internal("operation signature does not verify".into()));
        }
        if let Some(shape) = op.shape() {
            geometry::validate_shape(shape, &self.settings.canvas_settings)?;
        }
        let hash = op.hash()?;
        let newly_added = {
            let mut inner = self.mu.lock();
            if inner.mempool.contains_key(&hash) {
                false
            } else {
                inner.mempool.insert(hash.clone(), op.clone());
                true
            }
        };
        if newly_added {
            debug!(op = %hash, "operation admitted");
            self.work.notify_one();
            self.flood_operation(op.clone());
        }
        Ok(newly_added)
    }

    /// Validates and inserts a block. Exactly one concurrent admission of
    /// a hash observes true; that first accept derives state, re-evaluates
    /// the longest chain, resolves waiters, wakes the assembler, and fans
    /// the block out to peers.
    pub fn accept_block(self: &Arc<Self>, block: Block) -> Result<bool> {
        let hash = block.hash()?;
        if !block.nonce_is_valid(&self.settings)? {
            return Err(Error::Internal(format!(
                "block {hash} does not satisfy its difficulty class"
            )));
        }
        let first = {
            let mut inner = self.mu.lock();
            inner.graph.insert(hash.clone(), block.clone())
        };
        if !first {
            return Ok(false);
        }
        debug!(block = %hash, num = block.block_num, "block accepted");
        if let Err(err) = self.derive_state(&hash) {
            // Orphans sit in the graph until their ancestry arrives.
            debug!(block = %hash, %err, "state not derivable yet");
        }
        self.refresh_head();
        self.work.notify_one();
        self.announce_block(block);
        Ok(true)
    }

    /// Re-evaluates the longest chain and resolves any waiter whose
    /// operation has gathered enough confirmations at the new head.
    fn refresh_head(&self) {
        let head = {
            let mut inner = self.mu.lock();
            let (tip, _) = inner.graph.longest_tip();
            inner.head = tip.clone();
            tip
        };
        let state = match self.derive_state(&head) {
            Ok(state) => state,
            Err(err) => {
                debug!(%head, %err, "head state not derivable");
                return;
            }
        };
        self.resolve_ready_waiters(&head, &state);
    }

    fn resolve_ready_waiters(&self, head: &str, state: &CanvasState) {
        let mut resolved = Vec::new();
        {
            let mut inner = self.mu.lock();
            let ready: Vec<(String, u64)> = inner
                .waiters
                .iter()
                .filter_map(|(op_hash, waiter)| {
                    let age = *state.committed.get(op_hash)?;
                    (age >= u64::from(waiter.validate_num)).then(|| (op_hash.clone(), age))
                })
                .collect();
            for (op_hash, age) in ready {
                // The committing block sits `age` links behind the head.
                let mut cursor = head.to_owned();
                let mut ok = true;
                for _ in 0..age {
                    match inner.graph.get(&cursor) {
                        Some(block) => cursor = block.prev.clone(),
                        None => {
                            ok = false;
                            break;
                        }
                    }
                }
                if !ok {
                    continue;
                }
                if let Some(waiter) = inner.waiters.remove(&op_hash) {
                    resolved.push((op_hash, waiter, cursor));
                }
            }
        }
        for (op_hash, waiter, committing_block) in resolved {
            debug!(op = %op_hash, block = %committing_block, "operation confirmed");
            let _ = waiter.tx.send(Ok(committing_block));
        }
    }

    /// Registers a confirmation waiter for an operation. Call before
    /// admitting the operation so a fast commit cannot slip past.
    pub(crate) fn register_waiter(
        &self,
        op_hash: String,
        validate_num: u8,
    ) -> Result<oneshot::Receiver<Result<String>>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.mu.lock();
            inner.waiters.insert(
                op_hash,
                CommitWaiter {
                    validate_num,
                    tx,
                },
            );
        }
        if self.stopper.is_stopped() {
            return Err(Error::Stopping);
        }
        // The operation may already be confirmed on the current chain.
        let head = self.head();
        if let Ok(state) = self.derive_state(&head) {
            self.resolve_ready_waiters(&head, &state);
        }
        Ok(rx)
    }

    pub(crate) async fn await_waiter(
        &self,
        rx: oneshot::Receiver<Result<String>>,
    ) -> Result<String> {
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Stopping),
        }
    }

    /// Fails a parked waiter; used when candidate assembly has given up
    /// on its operation.
    pub(crate) fn fail_waiter(&self, op_hash: &str, err: Error) {
        let waiter = self.mu.lock().waiters.remove(op_hash);
        if let Some(waiter) = waiter {
            warn!(op = %op_hash, %err, "operation abandoned");
            let _ = waiter.tx.send(Err(err));
        }
    }

    /// Looks a shape up at the head state, falling back to every other
    /// derived state.
    pub fn find_shape(&self, shape_hash: &str) -> Option<Shape> {
        if let Ok(state) = self.head_state() {
            if let Some(shape) = state.shapes.get(shape_hash) {
                return Some(shape.clone());
            }
        }
        let inner = self.mu.lock();
        let found = inner
            .states
            .iter()
            .find_map(|(_, state)| state.shapes.get(shape_hash).cloned());
        found
    }
}
