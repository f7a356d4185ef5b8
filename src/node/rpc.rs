// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! The miner's RPC surface. One listener serves two audiences over the
//! same service: the local art node (canvas queries and mutations) and
//! other miners (hello, gossip, heartbeat).
//!
//! Art-node calls that wait on confirmations can outlive the default
//! request deadline; clients submitting with a large `validate_num`
//! should extend the deadline on their context accordingly.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{future, StreamExt};
use serde::{Deserialize, Serialize};
use tarpc::context::Context;
use tarpc::server::{self, Channel};
use tarpc::tokio_serde::formats::Json;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::geometry;
use crate::node::Miner;
use crate::primitives::{Block, OpKind, Operation};
use crate::settings::CanvasSettings;

/// Reply to a confirmed shape addition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddShapeReply {
    /// Hash of the block that committed the operation.
    pub block_hash: String,
    /// The submitter's ink balance at that block.
    pub ink_remaining: u32,
}

#[tarpc::service]
pub trait MinerApi {
    // -- art node surface --

    /// Cheap probe so a client can tell transport failures from logical
    /// errors.
    async fn test_connection() -> bool;

    /// Returns the canvas dimensions. Fails unless the caller holds this
    /// miner's key.
    async fn open_canvas(pub_key: String) -> Result<CanvasSettings>;

    /// Admits an ADD, floods it, and blocks until `validate_num`
    /// descendants extend the committing block.
    async fn add_shape(op: Operation) -> Result<AddShapeReply>;

    /// Admits a DELETE, floods it, waits like `add_shape`, and returns
    /// the refunded balance.
    async fn delete_shape(op: Operation) -> Result<u32>;

    /// Ink balance of this miner's key at the current head.
    async fn get_ink() -> Result<u32>;

    /// Rendered `<path/>` element of a shape, wherever a derived state
    /// still knows it.
    async fn get_svg_string(shape_hash: String) -> Result<String>;

    /// Operation hashes of a block's records. Genesis has none.
    async fn get_shapes(block_hash: String) -> Result<Vec<String>>;

    async fn get_genesis_block() -> String;

    /// Hashes of all blocks whose parent is the given block.
    async fn get_children_blocks(block_hash: String) -> Result<Vec<String>>;

    // -- miner-to-miner surface --

    /// Introduces a miner: its dialable address and known block hashes.
    /// The receiver dials back and pushes over any blocks the sender is
    /// missing.
    async fn hello(addr: String, known_blocks: HashSet<String>);

    async fn heart_beat() -> bool;

    /// Gossip ingestion of an operation; first sighting re-floods.
    async fn notify_operation(op: Operation);

    /// Gossip ingestion of a block; first acceptance re-announces.
    async fn notify_block(block: Block);
}

/// The service handle the RPC layer hands to the core. All state lives
/// in the shared miner; the handle is freely cloneable per connection.
#[derive(Clone)]
pub struct MinerApiServer {
    pub node: Arc<Miner>,
}

impl MinerApi for MinerApiServer {
    async fn test_connection(self, _: Context) -> bool {
        true
    }

    async fn open_canvas(self, _: Context, pub_key: String) -> Result<CanvasSettings> {
        if pub_key != self.node.keys().public_hex() {
            return Err(Error::Disconnected(self.node.local_addr()));
        }
        Ok(self.node.settings().canvas_settings)
    }

    async fn add_shape(self, _: Context, op: Operation) -> Result<AddShapeReply> {
        let node = &self.node;
        let OpKind::Add { shape } = &op.kind else {
            return Err(Error::Internal("add_shape requires an ADD operation".into()));
        };
        geometry::validate_shape(shape, &node.settings().canvas_settings)?;
        let cost = geometry::ink_cost(shape)?;

        // Pre-test against the current head so obviously doomed
        // submissions fail fast instead of stalling in the mempool.
        let state = node.head_state()?;
        let balance = state.ink_of(&op.pub_key);
        if balance < cost {
            return Err(Error::InsufficientInk(balance));
        }
        for other_hash in state.shape_owners.keys() {
            if geometry::shapes_overlap(&state.shapes[other_hash], shape)? {
                return Err(Error::ShapeOverlap(other_hash.clone()));
            }
        }

        let op_hash = op.hash()?;
        let rx = node.register_waiter(op_hash, op.validate_num)?;
        node.admit_operation(&op)?;
        let block_hash = node.await_waiter(rx).await?;
        let ink_remaining = node.derive_state(&block_hash)?.ink_of(&op.pub_key);
        Ok(AddShapeReply {
            block_hash,
            ink_remaining,
        })
    }

    async fn delete_shape(self, _: Context, op: Operation) -> Result<u32> {
        let node = &self.node;
        let OpKind::Delete { shape_hash } = &op.kind else {
            return Err(Error::Internal(
                "delete_shape requires a DELETE operation".into(),
            ));
        };

        let state = node.head_state()?;
        match state.shape_owners.get(shape_hash) {
            Some(owner) if *owner == op.pub_key => {}
            _ => return Err(Error::ShapeOwner(shape_hash.clone())),
        }

        let op_hash = op.hash()?;
        let rx = node.register_waiter(op_hash, op.validate_num)?;
        node.admit_operation(&op)?;
        let block_hash = node.await_waiter(rx).await?;
        Ok(node.derive_state(&block_hash)?.ink_of(&op.pub_key))
    }

    async fn get_ink(self, _: Context) -> Result<u32> {
        let state = self.node.head_state()?;
        Ok(state.ink_of(self.node.keys().public_hex()))
    }

    async fn get_svg_string(self, _: Context, shape_hash: String) -> Result<String> {
        match self.node.find_shape(&shape_hash) {
            Some(shape) => Ok(shape.to_svg_element()),
            None => Err(Error::InvalidShapeHash(shape_hash)),
        }
    }

    async fn get_shapes(self, _: Context, block_hash: String) -> Result<Vec<String>> {
        let node = &self.node;
        if block_hash == node.settings().genesis_block_hash {
            return Ok(vec![]);
        }
        let inner = node.mu.lock();
        let block = inner
            .graph
            .get(&block_hash)
            .ok_or(Error::InvalidBlockHash(block_hash))?;
        block.records.iter().map(|op| op.hash()).collect()
    }

    async fn get_genesis_block(self, _: Context) -> String {
        self.node.settings().genesis_block_hash.clone()
    }

    async fn get_children_blocks(self, _: Context, block_hash: String) -> Result<Vec<String>> {
        let inner = self.node.mu.lock();
        if !inner.graph.contains(&block_hash) {
            return Err(Error::InvalidBlockHash(block_hash));
        }
        Ok(inner.graph.children(&block_hash))
    }

    async fn hello(self, _: Context, addr: String, known_blocks: HashSet<String>) {
        let node = self.node.clone();
        tokio::spawn(async move {
            node.handle_hello(addr, known_blocks).await;
        });
    }

    async fn heart_beat(self, _: Context) -> bool {
        !self.node.stopper().is_stopped()
    }

    async fn notify_operation(self, _: Context, op: Operation) {
        if let Err(err) = self.node.admit_operation(&op) {
            warn!(%err, "dropping gossiped operation");
        }
    }

    async fn notify_block(self, _: Context, block: Block) {
        match self.node.accept_block(block) {
            Ok(true) => {}
            Ok(false) => debug!("gossiped block already known"),
            Err(err) => warn!(%err, "dropping gossiped block"),
        }
    }
}

/// Binds the miner's listener before the miner itself exists: the bound
/// address comes back immediately (it feeds directory registration), and
/// serving starts once the built node is sent through the returned
/// sender. Serving stops when the node's stopper fires.
pub fn spawn_server(
    listen_addr: String,
) -> (
    oneshot::Receiver<std::io::Result<SocketAddr>>,
    oneshot::Sender<Arc<Miner>>,
) {
    let (addr_tx, addr_rx) = oneshot::channel();
    let (node_tx, node_rx) = oneshot::channel::<Arc<Miner>>();

    tokio::spawn(async move {
        let mut listener = match tarpc::serde_transport::tcp::listen(&listen_addr, Json::default)
            .await
        {
            Ok(listener) => listener,
            Err(err) => {
                let _ = addr_tx.send(Err(err));
                return;
            }
        };
        listener.config_mut().max_frame_length(16 * 1024 * 1024);
        let _ = addr_tx.send(Ok(listener.local_addr()));

        let Ok(node) = node_rx.await else { return };
        let stopper = node.stopper().clone();

        let serve_loop = listener
            .filter_map(|r| future::ready(r.ok()))
            .map(server::BaseChannel::with_defaults)
            .map(|channel| {
                let server = MinerApiServer { node: node.clone() };
                channel.execute(server.serve()).for_each(|f| async {
                    tokio::spawn(f);
                })
            })
            .buffer_unordered(64)
            .for_each(|_| async {});

        tokio::select! {
            _ = serve_loop => {}
            _ = stopper.stopped() => {}
        }
    });

    (addr_rx, node_tx)
}
