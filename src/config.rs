//! Process-level configuration.
//!
//! This is distinct from the per-request JSON bodies each endpoint accepts
//! (those carry the transform, bounding box, and scale parameters for a
//! single job); `ServiceConfig` only covers how the process itself starts
//! up: which port to listen on and how verbose to log.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "volpyramid", about = "Aligned-slice pyramid packaging service")]
pub struct ServiceConfig {
    /// TCP port to listen on. Falls back to the `PORT` env var, then 8080.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// `tracing-subscriber` EnvFilter directive, e.g. "info" or "volpyramid=debug".
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Root directory for the local-filesystem object store backend.
    /// Bucket names from incoming requests become subdirectories beneath
    /// this root (see [`crate::storage::bucket_path`]).
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: String,
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("port must be nonzero".to_string());
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            log_level: "info".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}
