//! # Component A: the aligned-tile producer
//!
//! Fetches a raw slice, warps it into an exact `W×H` aligned slice, emits a
//! CLAHE'd thumbnail, then carves the warped slice into grouped-tile
//! containers, one per super-block, written to the temp bucket by a small
//! fixed worker pool.
//!
//! ## Pipeline
//!
//! 1. Fetch the raw slice from `dest/raw/{img}` and decode it to grayscale.
//! 2. Warp it through the request's [`Affine`] into a `width × height`
//!    buffer.
//! 3. Downsample the warped slice by the largest power of two that brings
//!    it under 4096 on its long edge, CLAHE-equalize that downsample, and
//!    write it to `dest/align/{img}` as the alignment thumbnail.
//! 4. Split the warped slice into 4096×4096 super-blocks, and for each one,
//!    split it again into `shard_size`-square tiles, CLAHE-equalize each
//!    tile independently, and pack them into a grouped-tile container.
//!
//! ## Concurrency
//!
//! Step 4 runs across a fixed pool of [`PRODUCER_WORKERS`] OS threads via
//! [`std::thread::scope`]. Super-blocks are assigned to workers by index
//! modulo the worker count, so each worker's share of the work is static
//! and known in advance rather than pulled from a shared queue. The first
//! worker to fail records its error in a `Mutex<Option<CoreError>>`; later
//! workers check that cell before starting their next super-block and stop
//! early rather than racing to overwrite it.
//!
//! ## Future Optimizations
//!
//! The per-tile CLAHE pass re-equalizes the same pixel region independently
//! in every super-block that shares an edge with it, which is why adjacent
//! tiles can show a visible seam; see [`crate::clahe`] for why this isn't
//! fixed here.

use std::sync::Mutex;

use image::GrayImage;
use tile_container::geometry::{superblocks, tiles_in_superblock};
use tile_container::container::ContainerBuilder;
use tile_container::ContainerHeader;
use tokio::runtime::Handle;

use crate::affine::Affine;
use crate::clahe::{clahe, ClaheParams};
use crate::codec::{decode_gray, encode_png};
use crate::error::CoreError;
use crate::storage::{bucket_path, Storage};
use crate::warp::warp_slice;

const PRODUCER_WORKERS: u64 = 4;
const CLAHE_KERNEL: u32 = 1024;
const SUPERBLOCK_SIZE: u32 = 4096;

#[derive(Debug, Clone)]
pub struct ProducerRequest {
    pub img: String,
    pub dest: String,
    pub dest_tmp: String,
    pub transform: Affine,
    pub width: u32,
    pub height: u32,
    pub slice: i64,
    /// Must divide 4096. Only `1024` is end-to-end supported, since
    /// [`crate::assembler::run`] hard-requires it; other divisors produce
    /// containers `ngshard` cannot read back.
    pub shard_size: u32,
}

/// Smallest power-of-two factor `f` with `max(width, height) / f <= 4096`.
fn thumbnail_factor(width: u32, height: u32) -> u32 {
    let dim = width.max(height).max(1) as f64;
    let exponent = (dim / 4096.0).log2().ceil().max(0.0) as u32;
    1u32 << exponent
}

/// Box-average downsample by an integer factor (used only with the
/// power-of-two factors `thumbnail_factor` produces).
fn downsample_pow2(image: &GrayImage, factor: u32) -> GrayImage {
    if factor <= 1 {
        return image.clone();
    }
    let (w, h) = image.dimensions();
    let out_w = (w + factor - 1) / factor;
    let out_h = (h + factor - 1) / factor;
    let mut out = GrayImage::new(out_w, out_h);
    for oy in 0..out_h {
        let y0 = oy * factor;
        let y1 = (y0 + factor).min(h);
        for ox in 0..out_w {
            let x0 = ox * factor;
            let x1 = (x0 + factor).min(w);
            let mut sum = 0u64;
            let mut count = 0u64;
            for y in y0..y1 {
                for x in x0..x1 {
                    sum += image.get_pixel(x, y).0[0] as u64;
                    count += 1;
                }
            }
            let value = if count == 0 { 0 } else { (sum as f64 / count as f64).round() as u8 };
            out.put_pixel(ox, oy, image::Luma([value]));
        }
    }
    out
}

/// Run the producer synchronously. Intended to be invoked from an HTTP
/// handler via `tokio::task::spawn_blocking`; storage calls inside block on
/// `handle` rather than requiring an async caller, matching the "all I/O
/// blocks its worker" concurrency model.
pub fn run(storage: &dyn Storage, handle: &Handle, req: ProducerRequest) -> Result<(), CoreError> {
    if SUPERBLOCK_SIZE % req.shard_size.max(1) != 0 {
        return Err(CoreError::RequestMalformed(format!(
            "shard_size {} must divide {}",
            req.shard_size, SUPERBLOCK_SIZE
        )));
    }

    let raw = handle.block_on(storage.get(&bucket_path(&req.dest, &format!("raw/{}", req.img))))?;
    let source = decode_gray(&raw)?;
    let warped = warp_slice(&source, &req.transform, req.width, req.height)?;

    let factor = thumbnail_factor(req.width, req.height);
    let thumbnail_raw = downsample_pow2(&warped, factor);
    let thumbnail = clahe(&thumbnail_raw, &ClaheParams { kernel_size: CLAHE_KERNEL, clip_limit: 0.01 });
    let thumbnail_bytes = encode_png(&thumbnail)?;
    handle.block_on(storage.put(&bucket_path(&req.dest, &format!("align/{}", req.img)), thumbnail_bytes.into()))?;

    let blocks = superblocks(req.width as u64, req.height as u64);
    let first_error: Mutex<Option<CoreError>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for worker_id in 0..PRODUCER_WORKERS {
            let blocks = &blocks;
            let warped = &warped;
            let req = &req;
            let first_error = &first_error;
            scope.spawn(move || {
                for (job_id, block) in blocks.iter().enumerate() {
                    if job_id as u64 % PRODUCER_WORKERS != worker_id {
                        continue;
                    }
                    if let Err(e) = write_superblock(storage, handle, warped, req, block) {
                        let mut slot = first_error.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                        return;
                    }
                }
            });
        }
    });

    if let Some(e) = first_error.into_inner().unwrap() {
        return Err(e);
    }
    Ok(())
}

fn write_superblock(
    storage: &dyn Storage,
    handle: &Handle,
    warped: &GrayImage,
    req: &ProducerRequest,
    block: &tile_container::SuperBlock,
) -> Result<(), CoreError> {
    let header = ContainerHeader { width: req.width as u64, height: req.height as u64, shard_size: req.shard_size as u64 };
    let mut builder = ContainerBuilder::new(header);

    for tile in tiles_in_superblock(block, req.shard_size as u64) {
        let cropped = image::imageops::crop_imm(
            warped,
            tile.x as u32,
            tile.y as u32,
            tile.width as u32,
            tile.height as u32,
        )
        .to_image();
        let equalized = clahe(&cropped, &ClaheParams { kernel_size: CLAHE_KERNEL, clip_limit: 0.01 });
        builder.push_tile(encode_png(&equalized)?);
    }

    let bytes = builder.build();
    let key = format!("{}_{}_{}", req.slice, block.bx, block.by);
    handle.block_on(storage.put(&bucket_path(&req.dest_tmp, &key), bytes.into()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_factor_identity_up_to_4096() {
        assert_eq!(thumbnail_factor(4096, 4096), 1);
        assert_eq!(thumbnail_factor(1, 1), 1);
    }

    #[test]
    fn thumbnail_factor_halves_until_under_bound() {
        assert_eq!(thumbnail_factor(8192, 100), 2);
        assert_eq!(thumbnail_factor(16000, 100), 4);
    }

    #[test]
    fn downsample_pow2_identity_factor_is_noop() {
        let img = GrayImage::from_pixel(10, 10, image::Luma([5]));
        let out = downsample_pow2(&img, 1);
        assert_eq!(out, img);
    }

    #[test]
    fn downsample_pow2_shrinks_by_factor() {
        let img = GrayImage::from_pixel(8, 8, image::Luma([200]));
        let out = downsample_pow2(&img, 2);
        assert_eq!(out.dimensions(), (4, 4));
        assert!(out.pixels().all(|p| p.0[0] == 200));
    }
}
