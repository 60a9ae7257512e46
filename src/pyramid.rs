//! # Component C: the pyramid writer
//!
//! Writes one assembled cube across all six pyramid scales, downsampling
//! between levels. The actual neuroglancer precomputed sharded binary
//! format (minishard index, compressed shard directory) is a separate
//! collaborator library; this module only needs to hand each level's
//! voxels to a [`VolumeWriter`] at the right origin.
//!
//! ## Architecture
//!
//! - **Level 0** is written lossy-always and lossless-on-request, split
//!   into eight 512³ sub-cubes so no single chunk handed to the writer
//!   exceeds that size.
//! - **Levels 1 through 5** are written whole, lossy only, after halving
//!   the cube (and halving its origin) on each axis.
//! - The [`VolumeWriter`] trait is the boundary to the out-of-scope sharded
//!   writer: [`ObjectStoreVolumeWriter`] is the production implementation,
//!   storing each chunk as a raw blob under a `{encoding}/{level}/{origin}`
//!   key; [`NullVolumeWriter`] is a recording double for tests.
//!
//! ## Downsampling
//!
//! [`downsample`] halves a cube on every axis. Cubes up to 256³ go through
//! [`Volume::downsample_half`] directly; larger cubes are downsampled in
//! 256³ tiles so the working set of any single call stays bounded,
//! regardless of how large the assembled cube at level 0 is.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::storage::{bucket_path, Storage};
use crate::volume::Volume;

pub const NUM_LEVELS: u32 = 6;
const SUB_CUBE: u32 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Lossy,
    Lossless,
}

/// The out-of-scope "sharded volume writer" collaborator: accepts a 3D
/// voxel chunk at a given origin, scale level, and encoding. This crate
/// ships two implementations, a real one backed by [`Storage`] that stores
/// each chunk as a raw blob, and a recording double for tests; neither
/// reproduces the neuroglancer sharded binary layout itself.
#[async_trait]
pub trait VolumeWriter: Send + Sync {
    async fn write_chunk(
        &self,
        origin: (u64, u64, i64),
        level: u32,
        encoding: Encoding,
        volume: &Volume,
    ) -> Result<(), CoreError>;
}

pub struct ObjectStoreVolumeWriter<'a> {
    storage: &'a dyn Storage,
    dest_bucket: String,
}

impl<'a> ObjectStoreVolumeWriter<'a> {
    pub fn new(storage: &'a dyn Storage, dest_bucket: impl Into<String>) -> Self {
        Self { storage, dest_bucket: dest_bucket.into() }
    }

    fn key(&self, origin: (u64, u64, i64), level: u32, encoding: Encoding) -> String {
        let prefix = match encoding {
            Encoding::Lossy => "neuroglancer/jpeg",
            Encoding::Lossless => "neuroglancer/raw",
        };
        bucket_path(
            &self.dest_bucket,
            &format!("{prefix}/{level}/{}_{}_{}", origin.0, origin.1, origin.2),
        )
    }
}

#[async_trait]
impl<'a> VolumeWriter for ObjectStoreVolumeWriter<'a> {
    async fn write_chunk(
        &self,
        origin: (u64, u64, i64),
        level: u32,
        encoding: Encoding,
        volume: &Volume,
    ) -> Result<(), CoreError> {
        let key = self.key(origin, level, encoding);
        self.storage
            .put(&key, volume.data().to_vec().into())
            .await
            .map_err(|e| CoreError::writer(format!("writing chunk {key}"), WriterSource(e.to_string())))
    }
}

/// Test double that only records calls, matching the shape unit tests
/// need to assert against without a real backing store.
#[derive(Default)]
pub struct NullVolumeWriter {
    pub calls: std::sync::Mutex<Vec<((u64, u64, i64), u32, Encoding)>>,
}

#[async_trait]
impl VolumeWriter for NullVolumeWriter {
    async fn write_chunk(
        &self,
        origin: (u64, u64, i64),
        level: u32,
        encoding: Encoding,
        _volume: &Volume,
    ) -> Result<(), CoreError> {
        self.calls.lock().unwrap().push((origin, level, encoding));
        Ok(())
    }
}

#[derive(Debug)]
struct WriterSource(String);

impl std::fmt::Display for WriterSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for WriterSource {}

/// Write `cube` (already assembled at `origin`, scale 0) across all six
/// pyramid levels, downsampling between each.
pub async fn write_pyramid(
    writer: &dyn VolumeWriter,
    mut cube: Volume,
    mut origin: (u64, u64, i64),
    write_lossless: bool,
) -> Result<(), CoreError> {
    for level in 0..NUM_LEVELS {
        let (w, h, d) = cube.dims();
        if w == 0 || h == 0 || d == 0 {
            break;
        }

        if level == 0 {
            write_level_zero(writer, &cube, origin, write_lossless).await?;
        } else {
            writer.write_chunk(origin, level, Encoding::Lossy, &cube).await?;
        }

        if level + 1 < NUM_LEVELS {
            cube = downsample(&cube);
            origin = (origin.0 / 2, origin.1 / 2, origin.2 / 2);
        }
    }
    Ok(())
}

async fn write_level_zero(
    writer: &dyn VolumeWriter,
    cube: &Volume,
    origin: (u64, u64, i64),
    write_lossless: bool,
) -> Result<(), CoreError> {
    for i in 0..2u32 {
        for j in 0..2u32 {
            for k in 0..2u32 {
                let sub_origin = (i * SUB_CUBE, j * SUB_CUBE, k * SUB_CUBE);
                let sub = cube.sub_volume(sub_origin, (SUB_CUBE, SUB_CUBE, SUB_CUBE));
                let (sw, sh, sd) = sub.dims();
                if sw == 0 || sh == 0 || sd == 0 {
                    continue;
                }
                let global_origin = (
                    origin.0 + sub_origin.0 as u64,
                    origin.1 + sub_origin.1 as u64,
                    origin.2 + sub_origin.2 as i64,
                );
                writer.write_chunk(global_origin, 0, Encoding::Lossy, &sub).await?;
                if write_lossless {
                    writer.write_chunk(global_origin, 0, Encoding::Lossless, &sub).await?;
                }
            }
        }
    }
    Ok(())
}

/// Piecewise downsample: whole-cube if every axis is already small enough,
/// otherwise tiled in 256³ pieces so the working set stays bounded.
fn downsample(cube: &Volume) -> Volume {
    let (w, h, d) = cube.dims();
    if w <= 256 && h <= 256 && d <= 256 {
        return cube.downsample_half();
    }

    let out_w = Volume::half_up(w);
    let out_h = Volume::half_up(h);
    let out_d = Volume::half_up(d);
    let mut out = Volume::zeros(out_w, out_h, out_d);

    let mut z = 0;
    while z < d {
        let mut y = 0;
        while y < h {
            let mut x = 0;
            while x < w {
                let piece = cube.sub_volume((x, y, z), (256, 256, 256));
                let down = piece.downsample_half();
                let (dw, dh, dd) = down.dims();
                copy_into(&mut out, &down, (x / 2, y / 2, z / 2), (dw, dh, dd));
                x += 256;
            }
            y += 256;
        }
        z += 256;
    }
    out
}

fn copy_into(dest: &mut Volume, src: &Volume, origin: (u32, u32, u32), size: (u32, u32, u32)) {
    let (ox, oy, oz) = origin;
    let (dw, dh, dd) = dest.dims();
    let (w, h, d) = size;
    for zi in 0..d.min(dd.saturating_sub(oz)) {
        for yi in 0..h.min(dh.saturating_sub(oy)) {
            for xi in 0..w.min(dw.saturating_sub(ox)) {
                dest.set(ox + xi, oy + yi, oz + zi, src.get(xi, yi, zi));
            }
        }
    }
}
