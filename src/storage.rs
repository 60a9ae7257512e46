//! Object storage abstraction.
//!
//! The producer, assembler, and pyramid writer only ever need three
//! operations against the backing store: a whole-object `get`, a
//! byte-range `get_range`, and a `put`. [`Storage`] expresses exactly that
//! surface so the pipeline code depends on a trait, not on a concrete
//! backend. [`ObjectStoreBackend`] implements it over any
//! `object_store::ObjectStore` (local disk, S3, GCS); tests use
//! `object_store::memory::InMemory` through the same wrapper.

use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path as StorePath;
use object_store::ObjectStore as DynObjectStore;

use crate::error::CoreError;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, path: &str) -> Result<Bytes, CoreError>;
    async fn get_range(&self, path: &str, range: Range<u64>) -> Result<Bytes, CoreError>;
    async fn put(&self, path: &str, bytes: Bytes) -> Result<(), CoreError>;
}

/// `Storage` backed by a real `object_store::ObjectStore`.
pub struct ObjectStoreBackend {
    store: Arc<dyn DynObjectStore>,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn DynObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Storage for ObjectStoreBackend {
    async fn get(&self, path: &str) -> Result<Bytes, CoreError> {
        let p = StorePath::from(path);
        let result = self
            .store
            .get(&p)
            .await
            .map_err(|e| CoreError::storage(format!("get {path}"), e))?;
        result
            .bytes()
            .await
            .map_err(|e| CoreError::storage(format!("read body of {path}"), e))
    }

    async fn get_range(&self, path: &str, range: Range<u64>) -> Result<Bytes, CoreError> {
        let p = StorePath::from(path);
        let usize_range = range.start as usize..range.end as usize;
        self.store
            .get_range(&p, usize_range)
            .await
            .map_err(|e| CoreError::storage(format!("get_range {path}"), e))
    }

    async fn put(&self, path: &str, bytes: Bytes) -> Result<(), CoreError> {
        let p = StorePath::from(path);
        self.store
            .put(&p, bytes.into())
            .await
            .map_err(|e| CoreError::storage(format!("put {path}"), e))?;
        Ok(())
    }
}

/// Join a logical bucket name with an object key.
///
/// Every component's request carries bucket names (`dest`, `dest-tmp`,
/// `source`) addressing distinct logical object stores. Rather than wiring
/// up one `Storage` per bucket, this crate runs a single backing store and
/// treats the bucket name as a path prefix within it, the same shape as
/// addressing multiple tenants through one `object_store` client.
pub fn bucket_path(bucket: &str, key: &str) -> String {
    format!("{bucket}/{key}")
}

/// Build an in-memory `Storage` for tests.
pub fn in_memory() -> Arc<dyn Storage> {
    Arc::new(ObjectStoreBackend::new(Arc::new(
        object_store::memory::InMemory::new(),
    )))
}
