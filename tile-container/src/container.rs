// SPDX-License-Identifier: MIT
//! The grouped-tile container byte layout.
//!
//! ```text
//! offset  size  field
//!   0      8    width                  (full slice width)
//!   8      8    height                 (full slice height)
//!  16      8    shard_size
//!  24      8    payload_start[0]       (absolute offset of tile 0)
//!  32      8    payload_start[1]
//!  ...
//! 24+8k    8    payload_end            (one past the last tile)
//! ...           concatenated encoded tiles, in row-major order
//! ```
//!
//! All integers are unsigned little-endian 64-bit. `k` tiles produce `k+1`
//! offset-table entries (`payload_start[0..=k]`, with `payload_start[k]`
//! being `payload_end`).

use crate::error::ContainerError;

/// Fixed-size prefix: width, height, shard_size.
pub const HEADER_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub width: u64,
    pub height: u64,
    pub shard_size: u64,
}

impl ContainerHeader {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.shard_size.to_le_bytes());
    }

    pub fn read(bytes: &[u8]) -> Result<Self, ContainerError> {
        if bytes.len() < HEADER_LEN {
            return Err(ContainerError::Truncated {
                need: HEADER_LEN,
                have: bytes.len(),
            });
        }
        let u64_at = |off: usize| u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        Ok(Self {
            width: u64_at(0),
            height: u64_at(8),
            shard_size: u64_at(16),
        })
    }
}

/// Assembles a container's bytes from a header and the row-major ordered,
/// already-encoded tile byte strings. Used by the aligned-tile producer;
/// one instance is built per super-block.
pub struct ContainerBuilder {
    header: ContainerHeader,
    tiles: Vec<Vec<u8>>,
}

impl ContainerBuilder {
    pub fn new(header: ContainerHeader) -> Self {
        Self {
            header,
            tiles: Vec::new(),
        }
    }

    pub fn push_tile(&mut self, encoded: Vec<u8>) {
        self.tiles.push(encoded);
    }

    /// Number of tiles pushed so far.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Serialize header, offset table, and payload into one contiguous
    /// byte buffer. `payload_start[0] = HEADER_LEN + (k+1) * 8`, and
    /// `payload_start[i+1] = payload_start[i] + tiles[i].len()`.
    pub fn build(self) -> Vec<u8> {
        let k = self.tiles.len();
        let offset_table_len = (k + 1) * 8;
        let payload_start_0 = (HEADER_LEN + offset_table_len) as u64;

        let mut offsets = Vec::with_capacity(k + 1);
        offsets.push(payload_start_0);
        for tile in &self.tiles {
            offsets.push(offsets.last().unwrap() + tile.len() as u64);
        }

        let total_len = *offsets.last().unwrap() as usize;
        let mut out = Vec::with_capacity(total_len);
        self.header.write(&mut out);
        for off in &offsets {
            out.extend_from_slice(&off.to_le_bytes());
        }
        for tile in &self.tiles {
            out.extend_from_slice(tile);
        }
        debug_assert_eq!(out.len(), total_len);
        out
    }
}

/// Byte range `[HEADER_LEN + 8*index, HEADER_LEN + 8*index + 16)` holding
/// the two offset-table entries bracketing tile `index`, the entire
/// random-access read the cube assembler issues against the backing store
/// before it knows anything else about the container.
pub fn offset_pair_byte_range(index: u64) -> std::ops::Range<u64> {
    let start = HEADER_LEN as u64 + index * 8;
    start..start + 16
}

/// Parse exactly the 16 bytes fetched via [`offset_pair_byte_range`] (not
/// the full container) into the `(payload_start, payload_start_next)` pair.
pub fn decode_offset_pair(bytes: &[u8]) -> Result<(u64, u64), ContainerError> {
    if bytes.len() < 16 {
        return Err(ContainerError::Truncated { need: 16, have: bytes.len() });
    }
    let a = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let b = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
    Ok((a, b))
}

/// Read the two offset-table entries bracketing tile `index`: bytes
/// `[HEADER_LEN + 8*index, HEADER_LEN + 8*index + 16)`. This is the entire
/// random-access read the cube assembler needs to locate a tile's byte
/// range; it never reads the rest of the offset table.
pub fn read_offset_pair(bytes: &[u8], index: u64) -> Result<(u64, u64), ContainerError> {
    let start = HEADER_LEN + (index as usize) * 8;
    let end = start + 16;
    if bytes.len() < end {
        return Err(ContainerError::Truncated {
            need: end,
            have: bytes.len(),
        });
    }
    let a = u64::from_le_bytes(bytes[start..start + 8].try_into().unwrap());
    let b = u64::from_le_bytes(bytes[start + 8..start + 16].try_into().unwrap());
    Ok((a, b))
}

/// Byte range (within the container object) holding tile `index`'s encoded
/// bytes, given the two bracketing offsets already read via
/// [`read_offset_pair`].
pub fn tile_byte_range(offset_pair: (u64, u64)) -> std::ops::Range<u64> {
    offset_pair.0..offset_pair.1
}

/// Validate the full offset table of an in-memory container: strictly
/// increasing, and `payload_end` equal to the container's own length.
/// Intended for tests and for the producer's own self-check after building
/// a container, not for the assembler's random-access path.
pub fn validate_full_container(bytes: &[u8], tile_count: usize) -> Result<(), ContainerError> {
    let mut prev = None;
    for i in 0..=tile_count {
        let start = HEADER_LEN + i * 8;
        if bytes.len() < start + 8 {
            return Err(ContainerError::Truncated {
                need: start + 8,
                have: bytes.len(),
            });
        }
        let value = u64::from_le_bytes(bytes[start..start + 8].try_into().unwrap());
        if let Some(p) = prev {
            if value <= p {
                return Err(ContainerError::NonMonotonicOffsets { index: i });
            }
        }
        prev = Some(value);
    }
    let payload_end = prev.unwrap();
    if payload_end as usize != bytes.len() {
        return Err(ContainerError::Truncated {
            need: payload_end as usize,
            have: bytes.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> ContainerHeader {
        ContainerHeader {
            width: 4096,
            height: 4096,
            shard_size: 1024,
        }
    }

    #[test]
    fn round_trip_header() {
        let h = header();
        let mut builder = ContainerBuilder::new(h);
        for i in 0..16u8 {
            builder.push_tile(vec![i; 10 + i as usize]);
        }
        let bytes = builder.build();
        let parsed = ContainerHeader::read(&bytes).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn offsets_strictly_increasing_and_cover_payload() {
        let mut builder = ContainerBuilder::new(header());
        let sizes = [5usize, 7, 3, 20];
        for &s in &sizes {
            builder.push_tile(vec![0xAB; s]);
        }
        let bytes = builder.build();
        validate_full_container(&bytes, sizes.len()).unwrap();
    }

    #[test]
    fn two_offset_read_matches_direct_tile_bytes() {
        let mut builder = ContainerBuilder::new(header());
        let tiles: Vec<Vec<u8>> = vec![vec![1; 11], vec![2; 22], vec![3; 33]];
        for t in &tiles {
            builder.push_tile(t.clone());
        }
        let bytes = builder.build();
        for (i, tile) in tiles.iter().enumerate() {
            let pair = read_offset_pair(&bytes, i as u64).unwrap();
            let range = tile_byte_range(pair);
            let fetched = &bytes[range.start as usize..range.end as usize];
            assert_eq!(fetched, tile.as_slice());
        }
    }

    #[test]
    fn offset_pair_range_matches_decode_offset_pair() {
        let mut builder = ContainerBuilder::new(header());
        let tiles: Vec<Vec<u8>> = vec![vec![1; 11], vec![2; 22], vec![3; 33]];
        for t in &tiles {
            builder.push_tile(t.clone());
        }
        let bytes = builder.build();
        for i in 0..tiles.len() as u64 {
            let range = offset_pair_byte_range(i);
            let slice = &bytes[range.start as usize..range.end as usize];
            let decoded = decode_offset_pair(slice).unwrap();
            let direct = read_offset_pair(&bytes, i).unwrap();
            assert_eq!(decoded, direct);
        }
    }

    #[test]
    fn tile_count_header_matches_grid() {
        let mut builder = ContainerBuilder::new(header());
        for _ in 0..16 {
            builder.push_tile(vec![0u8; 4]);
        }
        assert_eq!(builder.tile_count(), 16);
    }
}
