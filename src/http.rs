//! # HTTP surface
//!
//! The three request endpoints: `/alignedslice`, `/ngmeta`, `/ngshard`.
//!
//! ## Request handling
//!
//! Each handler parses a JSON body (following the wire format's
//! string-encoded sub-fields: `transform` and `bbox` are themselves
//! JSON-encoded strings, not nested JSON), dispatches the matching
//! pipeline component via `spawn_blocking`, and reports `200 "success"` or
//! `400 <message>`.
//!
//! ## Routes
//!
//! - **`/alignedslice`**: runs [`crate::producer::run`], warping a raw
//!   slice and writing its grouped-tile containers.
//! - **`/ngmeta`**: writes the neuroglancer multiscale descriptors via
//!   [`crate::metadata`]; `shard-size` must be `1024`.
//! - **`/ngshard`**: runs [`crate::assembler::run`] to assemble one cube,
//!   then [`crate::pyramid::write_pyramid`] to write it across all six
//!   scales; `shard-size` must be `1024`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::affine::Affine;
use crate::assembler::{self, AssemblerRequest};
use crate::error::{CoreError, FullChain};
use crate::metadata;
use crate::producer::{self, ProducerRequest};
use crate::pyramid::{self, ObjectStoreVolumeWriter};
use crate::storage::{bucket_path, Storage};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/alignedslice", post(alignedslice))
        .route("/ngmeta", post(ngmeta))
        .route("/ngshard", post(ngshard))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn success() -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/html")], "success").into_response()
}

fn parse_int_stringable(value: &Value, field: &str) -> Result<i64, CoreError> {
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| CoreError::RequestMalformed(format!("{field} is not an integer"))),
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|_| CoreError::RequestMalformed(format!("{field} is not an integer-stringable value"))),
        _ => Err(CoreError::RequestMalformed(format!("{field} must be a number or numeric string"))),
    }
}

fn parse_bbox(bbox: &str) -> Result<(u32, u32), CoreError> {
    let values: Vec<i64> = serde_json::from_str(bbox)
        .map_err(|e| CoreError::RequestMalformed(format!("bbox is not a JSON array: {e}")))?;
    if values.len() != 2 {
        return Err(CoreError::RequestMalformed(format!("bbox must have exactly 2 elements, got {}", values.len())));
    }
    Ok((values[0] as u32, values[1] as u32))
}

fn parse_write_raw(s: &str) -> Result<bool, CoreError> {
    match s.to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(CoreError::RequestMalformed(format!("writeRaw must be \"true\" or \"false\", got {other:?}"))),
    }
}

#[derive(Deserialize)]
struct AlignedSliceBody {
    img: String,
    dest: String,
    #[serde(rename = "dest-tmp")]
    dest_tmp: String,
    transform: String,
    bbox: String,
    slice: Value,
    #[serde(rename = "shard-size")]
    shard_size: u32,
}

async fn alignedslice(State(state): State<AppState>, Json(body): Json<AlignedSliceBody>) -> Response {
    match run_alignedslice(state, body).await {
        Ok(()) => success(),
        Err(e) => e.into_response(),
    }
}

async fn run_alignedslice(state: AppState, body: AlignedSliceBody) -> Result<(), CoreError> {
    let transform = Affine::from_json(&body.transform)?;
    let (width, height) = parse_bbox(&body.bbox)?;
    let slice = parse_int_stringable(&body.slice, "slice")?;

    let req = ProducerRequest {
        img: body.img,
        dest: body.dest,
        dest_tmp: body.dest_tmp,
        transform,
        width,
        height,
        slice,
        shard_size: body.shard_size,
    };
    let storage = state.storage;
    let handle = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || producer::run(storage.as_ref(), &handle, req))
        .await
        .map_err(|e| CoreError::ComputeFailure(format!("producer worker panicked: {e}")))?
}

#[derive(Deserialize)]
struct NgMetaBody {
    dest: String,
    minz: i64,
    maxz: i64,
    resolution: i64,
    bbox: String,
    #[serde(rename = "shard-size")]
    shard_size: u32,
    #[serde(rename = "writeRaw")]
    write_raw: String,
}

async fn ngmeta(State(state): State<AppState>, Json(body): Json<NgMetaBody>) -> Response {
    match run_ngmeta(state, body).await {
        Ok(()) => success(),
        Err(e) => e.into_response(),
    }
}

async fn run_ngmeta(state: AppState, body: NgMetaBody) -> Result<(), CoreError> {
    if body.shard_size != 1024 {
        return Err(CoreError::RequestMalformed(format!("shard-size must be 1024, got {}", body.shard_size)));
    }
    let (width, height) = parse_bbox(&body.bbox)?;
    let write_raw = parse_write_raw(&body.write_raw)?;

    let jpeg = metadata::jpeg_descriptor(width as i64, height as i64, body.minz, body.maxz, body.resolution);
    let bytes = serde_json::to_vec(&jpeg).map_err(|e| CoreError::ComputeFailure(e.to_string()))?;
    state.storage.put(&bucket_path(&body.dest, "neuroglancer/jpeg/info"), bytes.into()).await?;

    if write_raw {
        let raw = metadata::raw_descriptor(width as i64, height as i64, body.minz, body.maxz, body.resolution);
        let bytes = serde_json::to_vec(&raw).map_err(|e| CoreError::ComputeFailure(e.to_string()))?;
        state.storage.put(&bucket_path(&body.dest, "neuroglancer/raw/info"), bytes.into()).await?;
    }
    Ok(())
}

#[derive(Deserialize)]
struct NgShardBody {
    dest: String,
    source: String,
    start: [u64; 3],
    minz: i64,
    maxz: i64,
    bbox: String,
    #[serde(rename = "shard-size")]
    shard_size: u64,
    #[serde(rename = "writeRaw")]
    write_raw: String,
}

async fn ngshard(State(state): State<AppState>, Json(body): Json<NgShardBody>) -> Response {
    match run_ngshard(state, body).await {
        Ok(()) => success(),
        Err(e) => FullChain(e).into_response(),
    }
}

async fn run_ngshard(state: AppState, body: NgShardBody) -> Result<(), CoreError> {
    if body.shard_size != 1024 {
        return Err(CoreError::RequestMalformed(format!("shard-size must be 1024, got {}", body.shard_size)));
    }
    let (width, height) = parse_bbox(&body.bbox)?;
    let write_raw = parse_write_raw(&body.write_raw)?;

    let assembler_req = AssemblerRequest {
        source: body.source,
        cx: body.start[0],
        cy: body.start[1],
        cz: body.start[2],
        minz: body.minz,
        maxz: body.maxz,
        width: width as u64,
        height: height as u64,
        shard_size: body.shard_size,
    };

    let storage = state.storage;
    let handle = tokio::runtime::Handle::current();
    let assembled = {
        let storage = storage.clone();
        tokio::task::spawn_blocking(move || assembler::run(storage.as_ref(), &handle, assembler_req))
            .await
            .map_err(|e| CoreError::ComputeFailure(format!("assembler worker panicked: {e}")))??
    };

    let writer = ObjectStoreVolumeWriter::new(storage.as_ref(), body.dest);
    pyramid::write_pyramid(&writer, assembled.volume, assembled.origin, write_raw).await?;
    Ok(())
}
