// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use clap::Parser;
use tarpc::context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use inkchain::crypto::Keypair;
use inkchain::miner;
use inkchain::node::{directory, rpc, Miner};
use inkchain::settings::MinerConfig;

/// A proof-of-work miner hosting a slice of the shared canvas.
#[derive(Debug, Parser)]
#[command(name = "inkminer", version)]
struct Args {
    /// Address of the directory service.
    directory_addr: String,
    /// PEM file holding this miner's public key.
    pub_key_file: PathBuf,
    /// PEM file holding this miner's private key.
    priv_key_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let keys = Keypair::load(&args.pub_key_file, &args.priv_key_file)
        .context("loading key pair")?;

    // Bind before registering so the directory learns the real port.
    let (addr_rx, node_tx) = rpc::spawn_server("127.0.0.1:0".to_owned());
    let local_addr = addr_rx
        .await
        .context("listener task died")?
        .context("binding the listener")?
        .to_string();
    info!(%local_addr, "listening");

    let directory_client = directory::connect(&args.directory_addr)
        .await
        .context("dialing the directory service")?;
    let settings = directory_client
        .register(
            context::current(),
            local_addr.clone(),
            keys.public_hex().to_owned(),
        )
        .await
        .context("directory register call failed")?
        .context("directory refused registration")?;
    info!(genesis = %settings.genesis_block_hash, "registered");

    let node: Arc<Miner> = Miner::new(settings, MinerConfig::default(), keys);
    node.set_local_addr(local_addr);
    node_tx
        .send(node.clone())
        .map_err(|_| anyhow!("listener task died before serving"))?;

    miner::spawn(node.clone());
    node.spawn_network_tasks(directory_client);

    tokio::signal::ctrl_c().await.context("signal handler")?;
    info!("shutting down");
    node.shutdown();
    Ok(())
}
