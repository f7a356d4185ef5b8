// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! The peer network: address book, bidirectional hello, gossip fan-out,
//! peer heartbeats, and directory-driven discovery.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tarpc::tokio_serde::formats::Json;
use tarpc::{client, context};
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::node::directory::DirectoryClient;
use crate::node::rpc::MinerApiClient;
use crate::node::Miner;
use crate::primitives::{Block, Operation};

/// How long a dial may take before the candidate peer is written off.
const DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// How often an under-connected miner asks the directory for addresses.
const DISCOVERY_INTERVAL: Duration = Duration::from_secs(5);

/// A connected peer: its dialable address and a live client handle.
/// Dropping the last handle closes the connection.
#[derive(Clone)]
pub struct Peer {
    pub address: String,
    pub client: MinerApiClient,
}

/// Dials a miner's RPC endpoint.
pub async fn connect_api(addr: &str) -> Result<MinerApiClient> {
    let transport = timeout(
        DIAL_TIMEOUT,
        tarpc::serde_transport::tcp::connect(addr, Json::default),
    )
    .await
    .map_err(|_| Error::Disconnected(addr.to_owned()))?
    .map_err(|_| Error::Disconnected(addr.to_owned()))?;
    Ok(MinerApiClient::new(client::Config::default(), transport).spawn())
}

impl Miner {
    /// Adds a peer by address, idempotently: an already-known address is
    /// left untouched, the local address is refused, and a lost insert
    /// race keeps the first connection. A brand-new peer receives a hello
    /// carrying our address and known block hashes, and gets a heartbeat
    /// task.
    pub async fn add_peer(self: &Arc<Self>, addr: String) -> Result<()> {
        if addr == self.local_addr() || addr.is_empty() {
            return Ok(());
        }
        if self.mu.lock().peers.contains_key(&addr) {
            return Ok(());
        }

        let client = connect_api(&addr).await?;

        let (inserted, known_blocks) = {
            let mut inner = self.mu.lock();
            if inner.peers.contains_key(&addr) {
                (false, HashSet::new())
            } else {
                inner.peers.insert(
                    addr.clone(),
                    Peer {
                        address: addr.clone(),
                        client: client.clone(),
                    },
                );
                let known: HashSet<String> = inner.graph.hashes().cloned().collect();
                (true, known)
            }
        };
        if !inserted {
            return Ok(());
        }
        info!(peer = %addr, "peer added");

        if client
            .hello(context::current(), self.local_addr(), known_blocks)
            .await
            .is_err()
        {
            self.remove_peer(&addr);
            return Err(Error::Disconnected(addr));
        }

        let node = self.clone();
        tokio::spawn(async move {
            node.peer_heartbeat(addr).await;
        });
        Ok(())
    }

    pub fn remove_peer(&self, addr: &str) {
        if self.mu.lock().peers.remove(addr).is_some() {
            info!(peer = %addr, "peer removed");
        }
    }

    pub fn peer_count(&self) -> usize {
        self.mu.lock().peers.len()
    }

    fn peer_snapshot(&self) -> Vec<Peer> {
        self.mu.lock().peers.values().cloned().collect()
    }

    /// Handles an inbound hello: dial the sender back, then push every
    /// block it does not know, shallowest first so it can always find the
    /// parent before the child.
    pub(crate) async fn handle_hello(self: &Arc<Self>, addr: String, known: HashSet<String>) {
        debug!(peer = %addr, known = known.len(), "hello received");
        if let Err(err) = self.add_peer(addr.clone()).await {
            warn!(peer = %addr, %err, "could not dial hello sender back");
            return;
        }

        let to_send: Vec<Block> = {
            let inner = self.mu.lock();
            inner
                .graph
                .blocks_by_depth()
                .into_iter()
                .filter(|(hash, _)| !known.contains(hash))
                .map(|(_, block)| block)
                .collect()
        };
        let client = match self.mu.lock().peers.get(&addr) {
            Some(peer) => peer.client.clone(),
            None => return,
        };
        for block in to_send {
            if let Err(err) = client.notify_block(context::current(), block).await {
                warn!(peer = %addr, %err, "failed to push block history");
                return;
            }
        }
    }

    /// Best-effort fan-out of a new operation to every peer.
    pub(crate) fn flood_operation(self: &Arc<Self>, op: Operation) {
        for peer in self.peer_snapshot() {
            let op = op.clone();
            tokio::spawn(async move {
                if let Err(err) = peer.client.notify_operation(context::current(), op).await {
                    warn!(peer = %peer.address, %err, "operation gossip failed");
                }
            });
        }
    }

    /// Best-effort fan-out of a newly accepted block to every peer.
    pub(crate) fn announce_block(self: &Arc<Self>, block: Block) {
        for peer in self.peer_snapshot() {
            let block = block.clone();
            tokio::spawn(async move {
                if let Err(err) = peer.client.notify_block(context::current(), block).await {
                    warn!(peer = %peer.address, %err, "block gossip failed");
                }
            });
        }
    }

    /// Heartbeats one peer until it misses a full liveness window or
    /// returns an error, then evicts it.
    async fn peer_heartbeat(self: Arc<Self>, addr: String) {
        let mut ticker = interval(self.settings().heartbeat_interval());
        let window = self.settings().heartbeat_window();
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.stopper().stopped() => return,
            }
            let client = match self.mu.lock().peers.get(&addr) {
                Some(peer) => peer.client.clone(),
                None => return,
            };
            match timeout(window, client.heart_beat(context::current())).await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    warn!(peer = %addr, %err, "heartbeat error");
                    self.remove_peer(&addr);
                    return;
                }
                Err(_) => {
                    warn!(peer = %addr, "heartbeat timed out");
                    self.remove_peer(&addr);
                    return;
                }
            }
        }
    }

    /// Asks the directory for more miners while under-connected.
    async fn discover_once(self: &Arc<Self>, directory: &DirectoryClient) {
        if self.peer_count() >= usize::from(self.settings().min_num_miner_connections) {
            return;
        }
        let addrs = match directory
            .get_nodes(context::current(), self.keys().public_hex().to_owned())
            .await
        {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(err)) => {
                warn!(%err, "directory refused node query");
                return;
            }
            Err(err) => {
                warn!(%err, "directory unreachable");
                return;
            }
        };
        debug!(count = addrs.len(), "directory returned peers");
        for addr in addrs {
            let node = self.clone();
            tokio::spawn(async move {
                if let Err(err) = node.add_peer(addr.clone()).await {
                    debug!(peer = %addr, %err, "failed to add discovered peer");
                }
            });
        }
    }

    /// Spawns the peer-discovery ticker and the directory heartbeat.
    pub fn spawn_network_tasks(self: &Arc<Self>, directory: DirectoryClient) {
        let node = self.clone();
        let discover_directory = directory.clone();
        tokio::spawn(async move {
            let mut ticker = interval(DISCOVERY_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = node.stopper().stopped() => return,
                }
                node.discover_once(&discover_directory).await;
            }
        });

        let node = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(node.settings().heartbeat_interval());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = node.stopper().stopped() => return,
                }
                if let Err(err) = directory
                    .heart_beat(context::current(), node.keys().public_hex().to_owned())
                    .await
                {
                    warn!(%err, "directory heartbeat failed");
                }
            }
        });
    }
}
