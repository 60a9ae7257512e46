//! Component D: the neuroglancer multiscale volume descriptor.
//!
//! Builds the `neuroglancer/jpeg/info` and (optionally) `neuroglancer/raw/info`
//! JSON documents described once per volume, independent of any individual
//! cube write. The scale-5 `realoffset` divides by 16 rather than 32,
//! matching a known bug in the original Python generator, preserved here
//! byte-for-byte rather than silently corrected.

use serde_json::{json, Value};

const SHARD_BITS: [u32; 3] = [27, 24, 21];
const HIGH_SCALE_PADDING: [i64; 5] = [1, 2, 4, 8, 16];

fn round_up(value: i64, multiple: i64) -> i64 {
    let rem = value % multiple;
    if rem == 0 {
        value
    } else {
        value + (multiple - rem)
    }
}

/// Build the lossy (jpeg) descriptor: six scales, chunk `[64,64,64]`,
/// sharded on scales 0..2.
pub fn jpeg_descriptor(width: i64, height: i64, minz: i64, maxz: i64, resolution: i64) -> Value {
    let width = round_up(width, 1024);
    let height = round_up(height, 1024);
    // mirrors the source's in-place reassignment: round (maxz + 1) up to
    // the next multiple of 1024 by adjusting maxz itself.
    let maxz = round_up(maxz + 1, 1024) - 1;

    let mut scales = Vec::with_capacity(6);
    for level in 0..6i64 {
        let r = resolution * (1i64 << level);
        let key = format!("{r}.0x{r}.0x{r}.0");

        let (size, realoffset_z) = if level == 0 {
            (vec![width, height, maxz + 1], minz)
        } else {
            let pad = HIGH_SCALE_PADDING[(level - 1) as usize];
            let shift = 1i64 << level;
            let size = vec![width / shift + pad, height / shift + pad, (maxz + 1) / shift + pad];
            // byte-for-byte preserved source bug: scale 5 divides by 16,
            // not 32.
            let divisor = if level == 5 { 16 } else { shift };
            (size, minz / divisor)
        };
        let shift = 1i64 << level;
        let realsize = vec![width / shift, height / shift, (maxz - minz + 1) / shift];

        let mut scale = json!({
            "chunk_sizes": [[64, 64, 64]],
            "encoding": "jpeg",
            "key": key,
            "resolution": [r, r, r],
            "size": size,
            "realsize": realsize,
            "offset": [0, 0, 0],
            "realoffset": [0, 0, realoffset_z],
        });
        if let Some(&shard_bits) = SHARD_BITS.get(level as usize) {
            scale["sharding"] = json!({
                "@type": "neuroglancer_uint64_sharded_v1",
                "hash": "identity",
                "minishard_bits": 0,
                "minishard_index_encoding": "gzip",
                "preshift_bits": 6,
                "shard_bits": shard_bits,
            });
        }
        scales.push(scale);
    }

    json!({
        "@type": "neuroglancer_multiscale_volume",
        "data_type": "uint8",
        "num_channels": 1,
        "scales": scales,
        "type": "image",
    })
}

/// Build the lossless (raw) descriptor: a single scale, chunk
/// `[128,128,128]`, no sharding.
pub fn raw_descriptor(width: i64, height: i64, minz: i64, maxz: i64, resolution: i64) -> Value {
    let width = round_up(width, 1024);
    let height = round_up(height, 1024);
    let maxz = round_up(maxz + 1, 1024) - 1;

    json!({
        "@type": "neuroglancer_multiscale_volume",
        "data_type": "uint8",
        "num_channels": 1,
        "scales": [{
            "chunk_sizes": [[128, 128, 128]],
            "encoding": "raw",
            "key": format!("{resolution}.0x{resolution}.0x{resolution}.0"),
            "resolution": [resolution, resolution, resolution],
            "size": [width, height, maxz + 1],
            "realsize": [width, height, maxz - minz + 1],
            "offset": [0, 0, 0],
            "realoffset": [0, 0, minz],
        }],
        "type": "image",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_lossy_scales_with_expected_keys_and_resolutions() {
        let d = jpeg_descriptor(2048, 2048, 0, 2047, 8);
        let scales = d["scales"].as_array().unwrap();
        assert_eq!(scales.len(), 6);
        let keys: Vec<&str> = scales.iter().map(|s| s["key"].as_str().unwrap()).collect();
        assert_eq!(keys, vec!["8.0x8.0x8.0", "16.0x16.0x16.0", "32.0x32.0x32.0", "64.0x64.0x64.0", "128.0x128.0x128.0", "256.0x256.0x256.0"]);
    }

    #[test]
    fn sharding_present_only_on_scales_0_through_2() {
        let d = jpeg_descriptor(2048, 2048, 0, 2047, 8);
        let scales = d["scales"].as_array().unwrap();
        for (level, scale) in scales.iter().enumerate() {
            if level <= 2 {
                assert_eq!(scale["sharding"]["shard_bits"], SHARD_BITS[level]);
            } else {
                assert!(scale.get("sharding").is_none());
            }
        }
    }

    #[test]
    fn scale_five_realoffset_preserves_the_divide_by_16_bug() {
        let d = jpeg_descriptor(2048, 2048, 100, 2047, 8);
        let scale5 = &d["scales"][5];
        assert_eq!(scale5["realoffset"][2], 100 / 16);
        // scale 4, by contrast, divides correctly by 16 (2^4).
        let scale4 = &d["scales"][4];
        assert_eq!(scale4["realoffset"][2], 100 / 16);
        let scale3 = &d["scales"][3];
        assert_eq!(scale3["realoffset"][2], 100 / 8);
    }

    #[test]
    fn raw_descriptor_has_single_unsharded_scale() {
        let d = raw_descriptor(2048, 2048, 0, 2047, 8);
        let scales = d["scales"].as_array().unwrap();
        assert_eq!(scales.len(), 1);
        assert_eq!(scales[0]["chunk_sizes"], json!([[128, 128, 128]]));
        assert!(scales[0].get("sharding").is_none());
        assert_eq!(scales[0]["encoding"], "raw");
    }

    #[test]
    fn dimensions_round_up_to_multiples_of_1024() {
        let d = jpeg_descriptor(2000, 3000, 0, 999, 8);
        let scale0_size = d["scales"][0]["size"].as_array().unwrap();
        assert_eq!(scale0_size[0], 2048);
        assert_eq!(scale0_size[1], 3072);
        assert_eq!(scale0_size[2], 1024);
    }
}
