//! Message protocol between the worker host and the build loop.
//!
//! Defines the tagged-JSON message types exchanged with the sandboxed
//! host: an `update` request triggers a full rebuild, a `result` response
//! carries the build output plus the module lists the host introspects.

use serde::{Deserialize, Serialize};

use lumen_core::types::{BuildOptions, BuildResult};

/// Messages sent from the host to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerRequest {
    /// Rebuild with the given runtime version and options.
    Update {
        version: String,
        options: BuildOptions,
    },
}

/// Messages sent from the worker back to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerResponse {
    /// Build finished. The flattened [`BuildResult`] exposes
    /// `clientModules` and `serverModules` for host introspection.
    Result {
        #[serde(flatten)]
        result: BuildResult,
    },
}
