// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced to art nodes and peers. The enum crosses the RPC
/// boundary, so every variant carries plain serializable data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum Error {
    /// The RPC transport to the given address failed.
    #[error("disconnected from {0}")]
    Disconnected(String),

    /// An ADD cannot be afforded. Carries the submitter's current balance.
    #[error("insufficient ink, current balance is {0}")]
    InsufficientInk(u32),

    /// Malformed path, closed-polygon violation, or a self-intersecting
    /// filled shape.
    #[error("invalid shape svg string: {0}")]
    InvalidShapeSvgString(String),

    /// The shape svg string exceeds the maximum length.
    #[error("shape svg string is longer than {} characters", crate::geometry::MAX_SVG_LEN)]
    ShapeSvgStringTooLong,

    /// The shape geometrically conflicts with a committed shape.
    #[error("shape overlaps existing shape {0}")]
    ShapeOverlap(String),

    /// A DELETE issued by a non-owner, or for a shape that does not exist.
    #[error("shape {0} does not exist or is not owned by the caller")]
    ShapeOwner(String),

    /// Unknown block identifier.
    #[error("no block with hash {0}")]
    InvalidBlockHash(String),

    /// Unknown shape identifier.
    #[error("no shape with hash {0}")]
    InvalidShapeHash(String),

    /// A computed vertex falls outside the canvas.
    #[error("shape extends outside the canvas")]
    OutOfBounds,

    /// The miner is shutting down.
    #[error("miner is stopping")]
    Stopping,

    /// Unexpected condition.
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn internal(err: impl std::fmt::Display) -> Self {
        Error::Internal(err.to_string())
    }
}
