// SPDX-License-Identifier: MIT
//! Super-block and tile grid math.
//!
//! A super-block is a 4096×4096 region of an aligned slice, grid-aligned to
//! origin `(0,0)`; super-blocks on the right/bottom edge of the slice are
//! clipped. Inside a super-block, tiles are `shard_size`-square (also
//! clipped at the edge) and are ordered row-major, y-outer then x-inner.

use crate::error::ContainerError;

/// Fixed super-block edge length.
pub const SUPERBLOCK_SIZE: u64 = 4096;

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// One (possibly edge-clipped) super-block of an aligned slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    pub bx: u64,
    pub by: u64,
    pub start_x: u64,
    pub start_y: u64,
    /// Clipped width: `min(SUPERBLOCK_SIZE, width - start_x)`.
    pub width: u64,
    /// Clipped height: `min(SUPERBLOCK_SIZE, height - start_y)`.
    pub height: u64,
}

impl SuperBlock {
    /// Number of `shard_size`-square tiles this super-block is carved into.
    pub fn tile_count(&self, shard_size: u64) -> u64 {
        ceil_div(self.width, shard_size) * ceil_div(self.height, shard_size)
    }

    /// Tile grid width: how many tile columns this super-block holds.
    pub fn tile_grid_width(&self, shard_size: u64) -> u64 {
        ceil_div(self.width, shard_size)
    }
}

/// Enumerate the super-blocks covering a `width × height` slice, in
/// row-major order (y-outer, x-inner), the order the producer assigns
/// `job_id` over for its 4-worker pool.
pub fn superblocks(width: u64, height: u64) -> Vec<SuperBlock> {
    let mut out = Vec::new();
    let mut by = 0;
    let mut start_y = 0;
    while start_y < height {
        let mut bx = 0;
        let mut start_x = 0;
        while start_x < width {
            out.push(SuperBlock {
                bx,
                by,
                start_x,
                start_y,
                width: (width - start_x).min(SUPERBLOCK_SIZE),
                height: (height - start_y).min(SUPERBLOCK_SIZE),
            });
            bx += 1;
            start_x += SUPERBLOCK_SIZE;
        }
        by += 1;
        start_y += SUPERBLOCK_SIZE;
    }
    out
}

/// A single (possibly edge-clipped) tile's placement inside its super-block,
/// in absolute slice pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    /// Column index within the super-block's tile grid.
    pub ix: u64,
    /// Row index within the super-block's tile grid.
    pub iy: u64,
    pub x: u64,
    pub y: u64,
    pub width: u64,
    pub height: u64,
}

/// Enumerate the tiles of a super-block in row-major (y-outer, x-inner)
/// order, the order tiles are appended to the container payload.
pub fn tiles_in_superblock(block: &SuperBlock, shard_size: u64) -> Vec<TileRect> {
    let cols = block.tile_grid_width(shard_size);
    let rows = ceil_div(block.height, shard_size);
    let mut out = Vec::with_capacity((cols * rows) as usize);
    for iy in 0..rows {
        for ix in 0..cols {
            let x = block.start_x + ix * shard_size;
            let y = block.start_y + iy * shard_size;
            out.push(TileRect {
                ix,
                iy,
                x,
                y,
                width: shard_size.min(block.start_x + block.width - x),
                height: shard_size.min(block.start_y + block.height - y),
            });
        }
    }
    out
}

/// Where a given `shard_size` tile (of the assembler's 1024-voxel cube grid)
/// lives: which container, and which tile index inside it.
///
/// Locating a tile within a container only requires reading the two
/// surrounding offset-table entries to fetch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLocation {
    pub bx: u64,
    pub by: u64,
    /// Row-major tile index within the `{bx}_{by}` container.
    pub tile_index: u64,
}

/// Compute the container and in-container tile index for the tile whose
/// top-left voxel is `(x0, y0)` in a slice of width `width`.
///
/// `chunk_width` matches the reference implementation's tile-count formula,
/// which counts against the slice's remaining width rather than the
/// super-block's clipped width. It agrees with the super-block's real
/// tile-grid width everywhere except the last super-block column of a
/// slice whose width is an exact multiple of 4096, where it under-counts
/// for every column past the first. Preserved rather than silently
/// corrected.
pub fn locate_tile(x0: u64, y0: u64, width: u64, shard_size: u64) -> TileLocation {
    let bx = x0 / SUPERBLOCK_SIZE;
    let by = y0 / SUPERBLOCK_SIZE;
    let ix = (x0 % SUPERBLOCK_SIZE) / shard_size;
    let iy = (y0 % SUPERBLOCK_SIZE) / shard_size;
    let chunk_width = ceil_div(SUPERBLOCK_SIZE.min(width.saturating_sub(x0)), shard_size);
    TileLocation {
        bx,
        by,
        tile_index: iy * chunk_width + ix,
    }
}

/// Validate `zfinish >= zstart` and return the inclusive voxel count.
pub fn z_extent(zstart: i64, zfinish: i64) -> Result<u64, ContainerError> {
    if zfinish < zstart {
        return Err(ContainerError::EmptyZRange { zstart, zfinish });
    }
    Ok((zfinish - zstart + 1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superblocks_identity_case() {
        let blocks = superblocks(4096, 4096);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0], SuperBlock { bx: 0, by: 0, start_x: 0, start_y: 0, width: 4096, height: 4096 });
    }

    #[test]
    fn superblocks_non_divisible() {
        let blocks = superblocks(5000, 3000);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].width, 4096);
        assert_eq!(blocks[1].width, 904);
        assert_eq!(blocks[1].bx, 1);
        assert_eq!(blocks[1].by, 0);
    }

    #[test]
    fn tile_grid_s1() {
        let blocks = superblocks(4096, 4096);
        let tiles = tiles_in_superblock(&blocks[0], 1024);
        assert_eq!(tiles.len(), 16);
        assert_eq!(tiles[0], TileRect { ix: 0, iy: 0, x: 0, y: 0, width: 1024, height: 1024 });
        assert_eq!(tiles[5], TileRect { ix: 1, iy: 1, x: 1024, y: 1024, width: 1024, height: 1024 });
    }

    #[test]
    fn tile_grid_s2_clipped() {
        let blocks = superblocks(5000, 3000);
        let tiles = tiles_in_superblock(&blocks[1], 1000);
        assert_eq!(tiles.len(), 3);
        for t in &tiles {
            assert_eq!(t.width, 904);
            assert_eq!(t.height, 1000);
        }
    }

    #[test]
    fn locate_tile_within_single_superblock() {
        let loc = locate_tile(0, 0, 2000, 1024);
        assert_eq!(loc, TileLocation { bx: 0, by: 0, tile_index: 0 });
        let loc = locate_tile(1024, 0, 2000, 1024);
        assert_eq!(loc, TileLocation { bx: 0, by: 0, tile_index: 1 });
    }
}
