// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! The directory service contract a miner consumes: registration,
//! address discovery, and liveness. The production service is operated
//! separately; this crate only ever dials it.

use tarpc::tokio_serde::formats::Json;
use tarpc::client;

use crate::error::{Error, Result};
use crate::settings::MinerNetSettings;

#[tarpc::service]
pub trait Directory {
    /// Registers a miner's dialable address and public key. Returns the
    /// network settings, or an error if the key or address is already
    /// registered.
    async fn register(addr: String, pub_key: String) -> Result<MinerNetSettings>;

    /// Addresses of other registered miners.
    async fn get_nodes(pub_key: String) -> Result<Vec<String>>;

    /// Liveness signal; a miner that misses a full heartbeat window is
    /// dropped from the registry.
    async fn heart_beat(pub_key: String) -> Result<()>;
}

/// Dials the directory service.
pub async fn connect(addr: &str) -> Result<DirectoryClient> {
    let transport = tarpc::serde_transport::tcp::connect(addr, Json::default)
        .await
        .map_err(|_| Error::Disconnected(addr.to_owned()))?;
    Ok(DirectoryClient::new(client::Config::default(), transport).spawn())
}
