//! # volpyramid
//!
//! Aligned-slice ingestion, cube assembly, and multiscale pyramid
//! packaging for a volumetric viewer.
//!
//! ## Key components
//!
//! - [`producer`] (component A) warps a raw slice through an affine
//!   transform, CLAHE-equalizes it, and carves it into grouped-tile
//!   containers; see [`tile_container`] for the shared byte layout.
//! - [`assembler`] (component B) reassembles a 1024³ voxel cube from those
//!   containers via the two-offset random-access read.
//! - [`pyramid`] (component C) writes an assembled cube across all six
//!   pyramid scales through a [`pyramid::VolumeWriter`].
//! - [`metadata`] (component D) builds the neuroglancer multiscale volume
//!   descriptor.
//! - [`http`] exposes all three as `axum` endpoints; [`storage`] is the
//!   object-store abstraction they all share.

pub mod affine;
pub mod assembler;
pub mod clahe;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod metadata;
pub mod producer;
pub mod pyramid;
pub mod storage;
pub mod volume;
pub mod warp;
