// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Network settings handed to a miner by the directory service on
//! registration, plus the local knobs a miner is constructed with.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Dimensions of the shared canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CanvasSettings {
    pub canvas_x_max: u32,
    pub canvas_y_max: u32,
}

/// Settings for one instance of the network. Every field is received from
/// the directory service on `register` and is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MinerNetSettings {
    /// Hash of the very first (empty) block in the chain. No block object
    /// exists for it.
    pub genesis_block_hash: String,

    /// The minimum number of miners a miner should stay connected to.
    pub min_num_miner_connections: u8,

    /// Mining ink reward for op and no-op blocks.
    pub ink_per_op_block: u32,
    pub ink_per_no_op_block: u32,

    /// Milliseconds between heartbeat messages to the directory service.
    /// Also bounds the per-peer liveness window.
    pub heart_beat: u32,

    /// Proof-of-work difficulty: exact number of trailing zero hex chars.
    pub pow_difficulty_op_block: u8,
    pub pow_difficulty_no_op_block: u8,

    pub canvas_settings: CanvasSettings,
}

impl MinerNetSettings {
    /// Interval at which heartbeats are actually sent. Five per liveness
    /// window tolerates scheduling jitter on either end.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.heart_beat) / 5)
    }

    /// Window after which a silent peer is considered dead.
    pub fn heartbeat_window(&self) -> Duration {
        Duration::from_millis(u64::from(self.heart_beat))
    }
}

/// Local construction-time knobs. These are per-miner, not per-network,
/// and are threaded through construction rather than read from globals.
#[derive(Debug, Clone, Default)]
pub struct MinerConfig {
    /// Artificial delay before each candidate assembly round. Used by
    /// tests to bound the block production rate.
    pub block_delay: Option<Duration>,
}
