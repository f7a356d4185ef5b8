// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use std::fs;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

/// Generates a P-256 key pair for a miner or art node.
#[derive(Debug, Parser)]
#[command(name = "genkeys", version)]
struct Args {
    /// Where to write the PEM public key.
    pub_key_file: PathBuf,
    /// Where to write the PEM private key.
    priv_key_file: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let (public_pem, private_pem) =
        inkchain::crypto::generate_pem_pair().context("generating key pair")?;
    fs::write(&args.pub_key_file, public_pem)
        .with_context(|| format!("writing {}", args.pub_key_file.display()))?;
    fs::write(&args.priv_key_file, private_pem)
        .with_context(|| format!("writing {}", args.priv_key_file.display()))?;
    println!(
        "wrote {} and {}",
        args.pub_key_file.display(),
        args.priv_key_file.display()
    );
    Ok(())
}
