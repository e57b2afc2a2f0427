//! Fetch interception for the worker host.
//!
//! The sandboxed host intercepts same-origin requests and asks this layer
//! whether a compiled client artifact claims the URL. A `None` answer
//! means "not mine": the host lets the request proceed untouched.

use url::Url;

use lumen_core::artifact::{ArtifactResponse, match_artifact};
use lumen_core::pipeline::BuildPipeline;

/// Match an intercepted request against the last-good client modules.
pub async fn intercept(
    pipeline: &BuildPipeline,
    version: &str,
    request_url: &Url,
) -> Option<ArtifactResponse> {
    let modules = pipeline.client_modules().await;
    let module = match_artifact(&modules, request_url)?;
    tracing::debug!("serving compiled artifact for {}", request_url.path());
    Some(ArtifactResponse::new(module, version))
}
