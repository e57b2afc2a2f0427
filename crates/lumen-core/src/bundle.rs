//! Bundler Orchestrator.
//!
//! Drives one bundling pass per target (client, server) through the
//! external bundling engine, supplying virtual-module resolution and
//! loading plus diagnostic capture. The engine itself is an opaque
//! capability; the orchestrator only shapes its inputs and maps its
//! outputs.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;

use crate::capability::CapabilitySet;
use crate::error::{Error, Result};
use crate::transform::{SymbolRef, TransformConfig, TransformPlugin};
use crate::types::{BuildMode, BuildOptions, CompiledModule, Diagnostic};

/// Import specifier of the framework core runtime.
pub const CORE_SPECIFIER: &str = "@lumen/core";
/// Import specifier of the JSX runtime, an alias of the core runtime.
pub const JSX_RUNTIME_SPECIFIER: &str = "@lumen/core/jsx-runtime";
/// Import specifier of the SSR runtime library.
pub const SERVER_SPECIFIER: &str = "@lumen/core/server";

/// Virtual id the core runtime specifiers resolve to.
pub const VIRTUAL_CORE_ID: &str = "\0lumen-core";
/// Virtual id the SSR runtime specifier resolves to.
pub const VIRTUAL_SERVER_ID: &str = "\0lumen-server";

/// Engine warnings carrying this marker are known noise and are dropped
/// before recording diagnostics.
const BENIGN_WARNING_MARKER: &str = "outputToFilesystem";

/// Which runtime a bundling pass targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleTarget {
    Client,
    Server,
}

impl BundleTarget {
    pub fn is_server(self) -> bool {
        matches!(self, BundleTarget::Server)
    }
}

/// Outcome of resolving one import specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Resolved to a module id the engine should load through the plugins.
    Id(String),
    /// Left external: passed through by its own specifier, not bundled.
    External(String),
}

/// A resolution/loading stage in the engine's plugin pipeline. Hooks are
/// consulted in plugin order; the first `Some` answer wins.
pub trait BundlePlugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve_id(&self, _specifier: &str, _importer: Option<&str>) -> Option<Resolution> {
        None
    }

    fn load(&self, _id: &str) -> Option<String> {
        None
    }
}

/// Module format of an emitted chunk set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFormat {
    /// Standard ES modules, allowed to split into multiple chunks.
    EsModule,
    /// Single synchronously executable module.
    CommonJs,
}

/// Output shaping for one bundling pass.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: ModuleFormat,
    pub inline_dynamic_imports: bool,
    pub entry_file_names: String,
    pub chunk_file_names: String,
}

impl OutputConfig {
    /// Per-target output conventions: server bundles inline into one
    /// executable module; client bundles split, with hashed names in
    /// production.
    pub fn for_target(target: BundleTarget, mode: BuildMode) -> Self {
        match (target, mode) {
            (BundleTarget::Server, _) => Self {
                format: ModuleFormat::CommonJs,
                inline_dynamic_imports: true,
                entry_file_names: "[name].js".to_string(),
                chunk_file_names: "[name].js".to_string(),
            },
            (BundleTarget::Client, BuildMode::Development) => Self {
                format: ModuleFormat::EsModule,
                inline_dynamic_imports: false,
                entry_file_names: "[name].js".to_string(),
                chunk_file_names: "[name].js".to_string(),
            },
            (BundleTarget::Client, BuildMode::Production) => Self {
                format: ModuleFormat::EsModule,
                inline_dynamic_imports: false,
                entry_file_names: "l-[hash].js".to_string(),
                chunk_file_names: "l-[hash].js".to_string(),
            },
        }
    }
}

/// Opaque incremental cache owned by the bundling engine. The orchestrator
/// hands it back on the next pass and never looks inside; cache validity
/// across differing entry graphs is the engine's own contract.
pub type EngineCache = Arc<dyn Any + Send + Sync>;

/// One bundling pass handed to the engine.
pub struct BundleJob<'a> {
    pub entry: &'a str,
    /// Pipeline plugins, consulted in order.
    pub plugins: &'a [&'a dyn BundlePlugin],
    pub cache: Option<EngineCache>,
    pub output: OutputConfig,
}

/// One chunk emitted by the engine.
#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub file_name: String,
    pub code: String,
    pub is_dynamic_entry: bool,
    /// Ids of the modules bundled into this chunk.
    pub modules: Vec<String>,
    pub imports: Vec<String>,
    pub dynamic_imports: Vec<String>,
}

/// Result of one engine invocation.
pub struct BundleOutput {
    pub chunks: Vec<OutputChunk>,
    /// Non-fatal engine warnings, captured instead of thrown.
    pub warnings: Vec<String>,
    pub cache: Option<EngineCache>,
}

/// External bundling engine capability.
pub trait BundleEngine: Send + Sync {
    /// Version of the installed engine.
    fn version(&self) -> &str;

    /// Resolve and emit the module graph rooted at `job.entry`. Resolution
    /// and loading go through `job.plugins` in order; an unresolvable
    /// graph fails with [`Error::Bundle`].
    fn bundle<'a>(&'a self, job: BundleJob<'a>) -> BoxFuture<'a, Result<BundleOutput>>;
}

/// Resolver/loader for the framework's virtual runtime modules.
///
/// Resolution rules, in order: the entry (no importer) resolves to itself;
/// the two core-runtime specifiers resolve to [`VIRTUAL_CORE_ID`]; the SSR
/// runtime specifier resolves to [`VIRTUAL_SERVER_ID`]; anything else is
/// external. The orchestrator bundles only the application's own modules
/// plus the virtual runtime ids.
pub struct VirtualModulePlugin {
    target: BundleTarget,
    client_runtime: Arc<str>,
    server_core: Arc<str>,
    server_runtime: Arc<str>,
}

impl VirtualModulePlugin {
    pub fn new(
        target: BundleTarget,
        client_runtime: Arc<str>,
        server_core: Arc<str>,
        server_runtime: Arc<str>,
    ) -> Self {
        Self {
            target,
            client_runtime,
            server_core,
            server_runtime,
        }
    }
}

impl BundlePlugin for VirtualModulePlugin {
    fn name(&self) -> &'static str {
        "lumen-virtual"
    }

    fn resolve_id(&self, specifier: &str, importer: Option<&str>) -> Option<Resolution> {
        if importer.is_none() {
            return Some(Resolution::Id(specifier.to_string()));
        }
        match specifier {
            CORE_SPECIFIER | JSX_RUNTIME_SPECIFIER => {
                Some(Resolution::Id(VIRTUAL_CORE_ID.to_string()))
            }
            SERVER_SPECIFIER => Some(Resolution::Id(VIRTUAL_SERVER_ID.to_string())),
            _ => Some(Resolution::External(specifier.to_string())),
        }
    }

    fn load(&self, id: &str) -> Option<String> {
        match id {
            VIRTUAL_CORE_ID if self.target.is_server() => Some(self.server_core.to_string()),
            VIRTUAL_CORE_ID => Some(self.client_runtime.to_string()),
            VIRTUAL_SERVER_ID if self.target.is_server() => Some(self.server_runtime.to_string()),
            _ => None,
        }
    }
}

/// Everything one bundling pass produced, besides its diagnostics.
pub struct BundlePass {
    pub modules: Vec<CompiledModule>,
    pub chunks: Vec<OutputChunk>,
    /// Module id → extracted symbol, from the transform stage.
    pub symbols: rustc_hash::FxHashMap<String, SymbolRef>,
    pub cache: Option<EngineCache>,
}

/// Run one bundling pass for the given target.
///
/// Diagnostics from the transform stage and engine warnings accumulate in
/// `diagnostics`; a transformation error or an engine failure is fatal to
/// the pass and surfaces as [`Error::Bundle`].
pub async fn bundle_app(
    caps: &CapabilitySet,
    client_runtime: Arc<str>,
    cache: Option<EngineCache>,
    options: &BuildOptions,
    diagnostics: &mut Vec<Diagnostic>,
    entry: &str,
    target: BundleTarget,
) -> Result<BundlePass> {
    let started = Instant::now();

    let config = TransformConfig::from_options(options, target.is_server());
    let transform = TransformPlugin::new(caps.transformer.as_ref(), &config);
    diagnostics.extend_from_slice(transform.diagnostics());
    if transform.has_errors() {
        let errors = transform
            .diagnostics()
            .iter()
            .filter(|d| d.severity == crate::types::Severity::Error)
            .count();
        return Err(Error::Bundle(format!(
            "transformation failed with {errors} error(s)"
        )));
    }

    let virtual_plugin = VirtualModulePlugin::new(
        target,
        client_runtime,
        caps.server_core_source.clone(),
        caps.server_runtime_source.clone(),
    );
    let plugins: [&dyn BundlePlugin; 2] = [&transform, &virtual_plugin];

    let job = BundleJob {
        entry,
        plugins: &plugins,
        cache,
        output: OutputConfig::for_target(target, options.build_mode),
    };
    let output = caps.engine.bundle(job).await?;

    for warning in &output.warnings {
        if warning.contains(BENIGN_WARNING_MARKER) {
            continue;
        }
        diagnostics.push(Diagnostic::warning(warning.clone()));
    }

    let modules = output
        .chunks
        .iter()
        .map(|chunk| CompiledModule {
            path: chunk.file_name.clone(),
            code: chunk.code.clone(),
            is_entry: chunk.is_dynamic_entry,
        })
        .collect();

    tracing::debug!(
        target = ?target,
        chunks = output.chunks.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "bundle pass complete"
    );

    Ok(BundlePass {
        modules,
        chunks: output.chunks,
        symbols: transform.symbols(),
        cache: output.cache,
    })
}
