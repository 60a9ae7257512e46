//! Error taxonomy for the pyramid packaging service.
//!
//! Every fallible path in this crate (request parsing, object storage,
//! image decoding, the warp/CLAHE/downsample pipelines, and the volume
//! writer boundary) resolves to one of the five [`CoreError`] variants.
//! Each HTTP endpoint is a strict boundary: any `CoreError` reaching a
//! handler is reported as `400 Bad Request` with the error's message, never
//! a panic or a partial write.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("malformed request: {0}")]
    RequestMalformed(String),

    #[error("storage failure: {context}")]
    StorageFailure {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("decode failure: {context}")]
    DecodeFailure {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("compute failure: {0}")]
    ComputeFailure(String),

    #[error("writer failure: {context}")]
    WriterFailure {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CoreError {
    pub fn storage(context: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::StorageFailure {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn decode(context: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::DecodeFailure {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn writer(context: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::WriterFailure {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Full cause chain, one entry per `source()` hop, joined with `": "`.
    /// Used by `/ngshard`, which echoes the entire chain rather than just
    /// the top message.
    pub fn chain(&self) -> String {
        let mut parts = vec![self.to_string()];
        let mut cur: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(self);
        while let Some(e) = cur {
            parts.push(e.to_string());
            cur = e.source();
        }
        parts.join(": ")
    }
}

impl From<tile_container::ContainerError> for CoreError {
    fn from(e: tile_container::ContainerError) -> Self {
        CoreError::ComputeFailure(e.to_string())
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "request failed");
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// Wraps a [`CoreError`] so handlers that must report the full cause chain
/// (rather than just the top-level message) can opt into it via a distinct
/// `IntoResponse` impl.
pub struct FullChain(pub CoreError);

impl IntoResponse for FullChain {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "request failed");
        (StatusCode::BAD_REQUEST, self.0.chain()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_joins_nested_sources() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "missing object");
        let err = CoreError::storage("fetching raw/slice.tif", inner);
        assert_eq!(err.chain(), "storage failure: fetching raw/slice.tif: missing object");
    }

    #[test]
    fn request_malformed_has_no_source() {
        let err = CoreError::RequestMalformed("bbox must have 6 elements".to_string());
        assert_eq!(err.chain(), "malformed request: bbox must have 6 elements");
    }
}
