//! End-to-end scenario tests exercising the producer, assembler, and
//! pyramid components together against an in-memory object store, without
//! going through the HTTP layer.

use std::sync::Arc;

use image::{GrayImage, Luma};
use tile_container::container::validate_full_container;
use tile_container::ContainerHeader;

use volpyramid::affine::Affine;
use volpyramid::assembler::{self, AssemblerRequest};
use volpyramid::codec::{decode_gray, encode_png};
use volpyramid::metadata;
use volpyramid::producer::{self, ProducerRequest};
use volpyramid::pyramid::{self, NullVolumeWriter};
use volpyramid::storage::{bucket_path, in_memory, Storage};

async fn put_raw_slice(storage: &Arc<dyn Storage>, dest: &str, name: &str, width: u32, height: u32) {
    let mut image = GrayImage::new(width, height);
    for (i, p) in image.pixels_mut().enumerate() {
        *p = Luma([(i % 256) as u8]);
    }
    let bytes = encode_png(&image).unwrap();
    storage.put(&bucket_path(dest, &format!("raw/{name}")), bytes.into()).await.unwrap();
}

async fn run_producer(storage: Arc<dyn Storage>, req: ProducerRequest) {
    let handle = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || producer::run(storage.as_ref(), &handle, req))
        .await
        .unwrap()
        .unwrap();
}

async fn run_assembler(storage: Arc<dyn Storage>, req: AssemblerRequest) -> assembler::AssembledCube {
    let handle = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || assembler::run(storage.as_ref(), &handle, req))
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn s1_identity_affine_produces_one_full_container_and_thumbnail() {
    let storage = in_memory();
    put_raw_slice(&storage, "dest", "s1.png", 4096, 4096).await;

    run_producer(
        storage.clone(),
        ProducerRequest {
            img: "s1.png".to_string(),
            dest: "dest".to_string(),
            dest_tmp: "tmp".to_string(),
            transform: Affine::IDENTITY,
            width: 4096,
            height: 4096,
            slice: 7,
            shard_size: 1024,
        },
    )
    .await;

    let container = storage.get(&bucket_path("tmp", "7_0_0")).await.unwrap();
    let header = ContainerHeader::read(&container).unwrap();
    assert_eq!(header, ContainerHeader { width: 4096, height: 4096, shard_size: 1024 });
    validate_full_container(&container, 16).unwrap();

    let thumbnail = storage.get(&bucket_path("dest", "align/s1.png")).await.unwrap();
    let decoded = decode_gray(&thumbnail).unwrap();
    assert_eq!(decoded.dimensions(), (4096, 4096));
}

#[tokio::test]
async fn s2_non_divisible_dimensions_split_into_expected_superblocks() {
    let storage = in_memory();
    put_raw_slice(&storage, "dest", "s2.png", 5000, 3000).await;

    run_producer(
        storage.clone(),
        ProducerRequest {
            img: "s2.png".to_string(),
            dest: "dest".to_string(),
            dest_tmp: "tmp".to_string(),
            transform: Affine::IDENTITY,
            width: 5000,
            height: 3000,
            slice: 9,
            shard_size: 1000,
        },
    )
    .await;

    let container = storage.get(&bucket_path("tmp", "9_1_0")).await.unwrap();
    let header = ContainerHeader::read(&container).unwrap();
    assert_eq!(header.shard_size, 1000);
    // super-block (1,0) is clipped to 904 wide; tile grid is ceil(904/1000)=1
    // column by ceil(3000/1000)=3 rows -> 3 tiles.
    validate_full_container(&container, 3).unwrap();
}

#[tokio::test]
async fn s3_two_offset_read_matches_directly_written_tile() {
    let storage = in_memory();
    put_raw_slice(&storage, "dest", "s3.png", 4096, 4096).await;

    run_producer(
        storage.clone(),
        ProducerRequest {
            img: "s3.png".to_string(),
            dest: "dest".to_string(),
            dest_tmp: "tmp".to_string(),
            transform: Affine::IDENTITY,
            width: 4096,
            height: 4096,
            slice: 7,
            shard_size: 1024,
        },
    )
    .await;

    let container = storage.get(&bucket_path("tmp", "7_0_0")).await.unwrap();
    // tile 5 is row y=1, col x=1 in a 4x4 grid.
    let range = tile_container::container::offset_pair_byte_range(5);
    let header_bytes = storage.get_range(&bucket_path("tmp", "7_0_0"), range).await.unwrap();
    let (start, end) = tile_container::container::decode_offset_pair(&header_bytes).unwrap();
    let direct = tile_container::container::read_offset_pair(&container, 5).unwrap();
    assert_eq!((start, end), direct);

    let tile_bytes = storage.get_range(&bucket_path("tmp", "7_0_0"), start..end).await.unwrap();
    let tile = decode_gray(&tile_bytes).unwrap();
    assert_eq!(tile.dimensions(), (1024, 1024));
}

#[tokio::test]
async fn s4_cube_assembly_fetches_only_the_one_slice_in_range() {
    let storage = in_memory();
    put_raw_slice(&storage, "dest", "s4.png", 2000, 2000).await;

    run_producer(
        storage.clone(),
        ProducerRequest {
            img: "s4.png".to_string(),
            dest: "dest".to_string(),
            dest_tmp: "tmp".to_string(),
            transform: Affine::IDENTITY,
            width: 2000,
            height: 2000,
            slice: 0,
            shard_size: 1024,
        },
    )
    .await;

    let assembled = run_assembler(
        storage.clone(),
        AssemblerRequest {
            source: "tmp".to_string(),
            cx: 0,
            cy: 0,
            cz: 0,
            minz: 0,
            maxz: 0,
            width: 2000,
            height: 2000,
            shard_size: 1024,
        },
    )
    .await;

    assert_eq!(assembled.volume.dims(), (1024, 1024, 1));
    assert_eq!(assembled.origin, (0, 0, 0));
}

#[test]
fn s5_pyramid_descriptors_cover_the_expected_keys_and_sharding() {
    let descriptor = metadata::jpeg_descriptor(2048, 2048, 0, 2047, 8);
    let scales = descriptor["scales"].as_array().unwrap();
    assert_eq!(scales.len(), 6);
    assert_eq!(scales[0]["key"], "8.0x8.0x8.0");
    assert_eq!(scales[5]["key"], "256.0x256.0x256.0");
    for (level, shard_bits) in [(0, 27), (1, 24), (2, 21)] {
        assert_eq!(scales[level]["sharding"]["shard_bits"], shard_bits);
    }

    let raw = metadata::raw_descriptor(2048, 2048, 0, 2047, 8);
    let raw_scales = raw["scales"].as_array().unwrap();
    assert_eq!(raw_scales.len(), 1);
    assert_eq!(raw_scales[0]["chunk_sizes"], serde_json::json!([[128, 128, 128]]));
}

#[tokio::test]
async fn s6_downsample_shape_reaches_32_cubed_after_five_levels() {
    let cube = volpyramid::volume::Volume::zeros(1024, 1024, 1024);
    let writer = NullVolumeWriter::default();
    pyramid::write_pyramid(&writer, cube, (0, 0, 0), false).await.unwrap();

    let calls = writer.calls.lock().unwrap();
    let highest_level = calls.iter().map(|(_, level, _)| *level).max().unwrap();
    assert_eq!(highest_level, 5);
}
