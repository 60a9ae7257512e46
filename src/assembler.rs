//! # Component B: the cube assembler
//!
//! Fetches one tile per Z-plane from the grouped-tile containers written by
//! the producer, using only the two-offset random-access read, and
//! assembles them into a `(X, Y, Z)`-ordered cube.
//!
//! ## Overview
//!
//! A request names a 1024-voxel cube by its grid coordinates `(cx, cy, cz)`
//! within a resolution level. For each Z-plane in range:
//!
//! - locate the tile covering `(cx, cy)` at that Z via
//!   [`tile_container::geometry::locate_tile`],
//! - read the container's `(payload_start, payload_start_next)` offset
//!   pair for that tile index,
//! - fetch only that byte range from the backing store and decode it,
//! - copy the decoded pixels into the cube's `(x, y, z)` plane.
//!
//! No container is ever read in full: every tile resolves to one bounded
//! object-store range read plus one tile-sized decode.
//!
//! ## Concurrency
//!
//! Z-planes are distributed across [`ASSEMBLER_WORKERS`] OS threads the
//! same way the producer distributes super-blocks: each worker owns the
//! planes whose index modulo the worker count matches its own id, and the
//! first worker to hit a [`CoreError`] stores it in a shared
//! `Mutex<Option<CoreError>>` that the others check between planes.

use std::sync::Mutex;

use tile_container::container::{decode_offset_pair, offset_pair_byte_range};
use tile_container::geometry::locate_tile;
use tokio::runtime::Handle;

use crate::codec::decode_gray;
use crate::error::CoreError;
use crate::storage::{bucket_path, Storage};
use crate::volume::Volume;

const ASSEMBLER_WORKERS: u64 = 20;
const SHARD_SIZE: u64 = 1024;

#[derive(Debug, Clone)]
pub struct AssemblerRequest {
    /// Bucket holding the producer's grouped-tile containers.
    pub source: String,
    pub cx: u64,
    pub cy: u64,
    pub cz: u64,
    pub minz: i64,
    pub maxz: i64,
    pub width: u64,
    pub height: u64,
    pub shard_size: u64,
}

/// The assembled cube, its Z extent, and its origin in voxel coordinates
/// (`(X, Y, Z)` order), the input the pyramid writer needs.
pub struct AssembledCube {
    pub volume: Volume,
    pub origin: (u64, u64, i64),
}

fn cube_z_extent(cz: u64, minz: i64, maxz: i64, shard_size: u64) -> Result<(i64, i64), CoreError> {
    let zstart = (cz as i64 * shard_size as i64).max(minz);
    let zfinish = maxz.min(zstart + shard_size as i64 - 1);
    if zfinish < zstart {
        return Err(CoreError::RequestMalformed(format!(
            "cube Z range is empty: zfinish ({zfinish}) < zstart ({zstart})"
        )));
    }
    Ok((zstart, zfinish))
}

fn fetch_tile(
    storage: &dyn Storage,
    handle: &Handle,
    source: &str,
    slice: i64,
    bx: u64,
    by: u64,
    tile_index: u64,
) -> Result<image::GrayImage, CoreError> {
    let key = bucket_path(source, &format!("{slice}_{bx}_{by}"));
    let range = offset_pair_byte_range(tile_index);
    let header_bytes = handle.block_on(storage.get_range(&key, range))?;
    let (start, end) = decode_offset_pair(&header_bytes)?;
    let tile_bytes = handle.block_on(storage.get_range(&key, start..end))?;
    decode_gray(&tile_bytes)
}

/// Run the assembler synchronously (see [`crate::producer::run`] for the
/// block-on-from-a-worker-thread rationale).
pub fn run(storage: &dyn Storage, handle: &Handle, req: AssemblerRequest) -> Result<AssembledCube, CoreError> {
    if req.shard_size != SHARD_SIZE {
        return Err(CoreError::RequestMalformed(format!(
            "shard_size must be {SHARD_SIZE}, got {}",
            req.shard_size
        )));
    }
    let (zstart, zfinish) = cube_z_extent(req.cz, req.minz, req.maxz, req.shard_size)?;
    let nz = (zfinish - zstart + 1) as u32;

    let loc = locate_tile(req.cx * req.shard_size, req.cy * req.shard_size, req.width, req.shard_size);

    let first_tile = fetch_tile(storage, handle, &req.source, zstart, loc.bx, loc.by, loc.tile_index)?;
    let (wt, ht) = first_tile.dimensions();

    let mut cube = Volume::zeros(wt, ht, nz);
    cube.plane_mut(0).copy_from_slice(first_tile.as_raw());

    let plane_len = wt as usize * ht as usize;
    let first_error: Mutex<Option<CoreError>> = Mutex::new(None);

    {
        let mut worker_jobs: Vec<Vec<(i64, u32, &mut [u8])>> = (0..ASSEMBLER_WORKERS).map(|_| Vec::new()).collect();
        for (z_index, plane) in cube.data_mut().chunks_mut(plane_len).enumerate().skip(1) {
            let abs_z = zstart + z_index as i64;
            let worker_id = (abs_z as u64) % ASSEMBLER_WORKERS;
            worker_jobs[worker_id as usize].push((abs_z, z_index as u32, plane));
        }

        std::thread::scope(|scope| {
            for jobs in worker_jobs {
                let source = &req.source;
                let first_error = &first_error;
                scope.spawn(move || {
                    for (abs_z, _z_index, plane) in jobs {
                        match fetch_tile(storage, handle, source, abs_z, loc.bx, loc.by, loc.tile_index) {
                            Ok(tile) => {
                                if tile.dimensions() != (wt, ht) {
                                    let mut slot = first_error.lock().unwrap();
                                    if slot.is_none() {
                                        slot.replace(CoreError::ComputeFailure(format!(
                                            "slice {abs_z} tile dimensions {:?} disagree with first slice's {:?}",
                                            tile.dimensions(),
                                            (wt, ht)
                                        )));
                                    }
                                    return;
                                }
                                plane.copy_from_slice(tile.as_raw());
                            }
                            Err(e) => {
                                let mut slot = first_error.lock().unwrap();
                                if slot.is_none() {
                                    slot.replace(e);
                                }
                                return;
                            }
                        }
                    }
                });
            }
        });
    }

    if let Some(e) = first_error.into_inner().unwrap() {
        return Err(e);
    }

    Ok(AssembledCube {
        volume: cube,
        origin: (req.cx * req.shard_size, req.cy * req.shard_size, zstart),
    })
}
