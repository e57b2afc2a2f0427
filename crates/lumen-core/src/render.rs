//! SSR Executor.
//!
//! Loads the generated server bundle into an isolated execution scope and
//! invokes its `render` entry point to produce pre-rendered HTML. The
//! execution scope is an injected [`ScriptRuntime`] capability exposing
//! only a module/export surface, never the host environment.

use futures::future::BoxFuture;

use crate::capability::CapabilitySet;
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::types::{CompiledModule, Diagnostic};

/// Options for one render invocation.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub url: String,
    pub base: String,
    /// Client manifest resolved for this build, if any.
    pub manifest: Option<Manifest>,
    pub debug: bool,
    /// Serialize resumable application state into the markup.
    pub snapshot: bool,
}

/// Result of a render invocation.
#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    pub html: String,
    /// Issues raised during rendering, e.g. a missing route.
    pub diagnostics: Vec<Diagnostic>,
}

/// The module surface a server bundle exposes after evaluation.
pub trait RenderModule: Send + Sync {
    /// Invoke the bundle's `render` export. A throwing entry surfaces as
    /// [`Error::Render`].
    fn render<'a>(&'a self, options: &'a RenderOptions) -> BoxFuture<'a, Result<RenderOutput>>;
}

/// Isolated execution scope for generated server bundles.
pub trait ScriptRuntime: Send + Sync {
    /// Version of the installed runtime.
    fn version(&self) -> &str;

    /// Evaluate a generated server bundle in an isolated module scope and
    /// hand back its export surface. Evaluation failures are reported as
    /// [`Error::Render`].
    fn evaluate(&self, code: &str) -> Result<Box<dyn RenderModule>>;
}

/// Deterministic HTML pretty-printer. Formatting is cosmetic, never
/// load-bearing; failures are swallowed by the caller.
pub trait HtmlFormatter: Send + Sync {
    fn format(&self, html: &str) -> Result<String>;
}

/// Execute the server bundle's render entry and return the produced HTML.
pub async fn render_html(
    caps: &CapabilitySet,
    server_modules: &[CompiledModule],
    options: &RenderOptions,
) -> Result<RenderOutput> {
    let started = std::time::Instant::now();
    let entry = server_modules
        .iter()
        .find(|m| m.path.ends_with(".js"))
        .ok_or_else(|| Error::Render("server bundle emitted no executable entry chunk".to_string()))?;

    let module = caps
        .script_runtime
        .evaluate(&entry.code)
        .map_err(Error::into_render)?;

    let mut output = module
        .render(options)
        .await
        .map_err(Error::into_render)?;

    if let Some(formatter) = &caps.formatter {
        match formatter.format(&output.html) {
            Ok(html) => output.html = html,
            Err(e) => tracing::debug!("html formatting failed, using raw output: {e}"),
        }
    }

    tracing::debug!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "SSR render complete"
    );
    Ok(output)
}
