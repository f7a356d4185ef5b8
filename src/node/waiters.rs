// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Per-operation confirmation waiters. A client call that admits an
//! operation parks here until enough descendant blocks extend the block
//! that committed it, or until the candidate assembler gives up on it.

use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// A parked client call.
#[derive(Debug)]
pub(crate) struct CommitWaiter {
    /// Descendant blocks required beyond the committing block.
    pub validate_num: u8,
    pub tx: oneshot::Sender<Result<String>>,
}

/// First failure observed for a mempool operation during candidate
/// assembly. Once `validate_num` further candidates have passed the
/// operation by, the error surfaces through the waiter.
#[derive(Debug, Clone)]
pub(crate) struct OpError {
    /// Block number of the first candidate that rejected the operation.
    pub block_num: u64,
    pub err: Error,
}
