// SPDX-License-Identifier: MIT
//! Errors raised while building or reading a grouped-tile container.

use thiserror::Error;

/// Failure modes confined to container geometry and byte layout.
///
/// Storage and decode failures happen one layer up (the caller owns the
/// bytes); this crate only reports on the shape of those bytes.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container offset table is not strictly increasing at tile {index}")]
    NonMonotonicOffsets { index: usize },

    #[error("container too short: need at least {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("tile index {index} out of range (container holds {count} tiles)")]
    TileIndexOutOfRange { index: usize, count: usize },

    #[error("cube Z range is empty: zfinish ({zfinish}) < zstart ({zstart})")]
    EmptyZRange { zstart: i64, zfinish: i64 },
}
