//! Request-time artifact lookup.
//!
//! Maps an incoming request path to a previously compiled client chunk and
//! returns its code verbatim. No other routing logic lives here: a miss
//! means "not mine" and the host adapter falls through to its own default
//! handling, never a 404 from this layer.

use url::Url;

use crate::types::CompiledModule;

/// Content type identifying executable script.
pub const ARTIFACT_CONTENT_TYPE: &str = "application/javascript; charset=utf-8";
/// Artifacts are ephemeral and build-specific; caching is disabled.
pub const ARTIFACT_CACHE_CONTROL: &str = "no-store";
/// Diagnostic header identifying the runtime version that produced the
/// artifact.
pub const ARTIFACT_VERSION_HEADER: &str = "x-lumen-repl";

/// Linear scan matching the request path against each chunk's absolute
/// URL, the chunk filename resolved relative to the request's own URL.
/// First match wins.
pub fn match_artifact<'a>(
    modules: &'a [CompiledModule],
    request_url: &Url,
) -> Option<&'a CompiledModule> {
    modules.iter().find(|module| {
        request_url
            .join(&format!("./{}", module.path))
            .map(|resolved| resolved.path() == request_url.path())
            .unwrap_or(false)
    })
}

/// Variant for hosts that serve chunks under a fixed base URL instead of
/// the request's own directory.
pub fn match_artifact_under_base<'a>(
    modules: &'a [CompiledModule],
    base: &Url,
    request_url: &Url,
) -> Option<&'a CompiledModule> {
    modules.iter().find(|module| {
        base.join(&module.path)
            .map(|resolved| resolved.path() == request_url.path())
            .unwrap_or(false)
    })
}

/// A matched artifact plus the response headers the host must attach.
#[derive(Debug, Clone)]
pub struct ArtifactResponse {
    pub code: String,
    pub content_type: &'static str,
    pub cache_control: &'static str,
    /// Value for the [`ARTIFACT_VERSION_HEADER`] header.
    pub version: String,
}

impl ArtifactResponse {
    pub fn new(module: &CompiledModule, version: impl Into<String>) -> Self {
        Self {
            code: module.code.clone(),
            content_type: ARTIFACT_CONTENT_TYPE,
            cache_control: ARTIFACT_CACHE_CONTROL,
            version: version.into(),
        }
    }
}
