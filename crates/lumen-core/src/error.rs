//! Error types for lumen-core.

use thiserror::Error;

/// Result type for lumen-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the build pipeline.
///
/// Fatal errors from any stage are caught at the top of the pipeline and
/// converted into a single `Error`-severity diagnostic on the build result;
/// they never cross a host boundary as a panic.
#[derive(Debug, Error)]
pub enum Error {
    /// A required capability failed to fetch or install.
    #[error("dependency load failed: {0}")]
    DependencyLoad(String),

    /// An installed capability reported a version other than the one the
    /// loader requested. Part of the dependency-load failure family.
    #[error("version mismatch for {name}: requested {requested}, installed {installed}")]
    VersionMismatch {
        name: String,
        requested: String,
        installed: String,
    },

    /// The bundling engine could not resolve or emit the module graph.
    #[error("bundle error: {0}")]
    Bundle(String),

    /// The server bundle's render entry failed.
    #[error("render error: {0}")]
    Render(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Reclassify any error raised while executing the server bundle as a
    /// render failure, keeping already-classified render errors intact.
    pub(crate) fn into_render(self) -> Error {
        match self {
            e @ Error::Render(_) => e,
            other => Error::Render(other.to_string()),
        }
    }
}
