//! In-memory capabilities for exercising the pipeline end to end.

use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use url::Url;

use lumen_core::bundle::{
    BundleEngine, BundleJob, BundleOutput, BundlePlugin, EngineCache, OutputChunk, Resolution,
};
use lumen_core::capability::{
    cdn_url, AssetFetcher, AssetRequest, CapabilityFactory, CapabilitySet, DependencyBundle,
    DependencyLoader, Minifier,
};
use lumen_core::error::{Error, Result};
use lumen_core::pipeline::{BuildPipeline, PipelineConfig};
use lumen_core::render::{HtmlFormatter, RenderModule, RenderOptions, RenderOutput, ScriptRuntime};
use lumen_core::transform::{
    SymbolRef, TransformConfig, TransformOutput, TransformedModule, Transformer,
};
use lumen_core::types::Diagnostic;

pub const ENGINE_VERSION: &str = "4.2.1";
pub const FORMATTER_VERSION: &str = "3.3.0";
pub const MINIFIER_VERSION: &str = "5.12.1";

const REQUIRED_ASSETS: &[&str] = &[
    "core.client",
    "core.server",
    "server",
    "transformer",
    "engine",
    "formatter",
];

/// In-memory fetcher with a per-URL failure list and a fetch counter.
#[derive(Default)]
pub struct StubFetcher {
    fetches: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    transformer_version_override: Mutex<Option<String>>,
}

impl StubFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Make fetches for URLs containing `marker` fail with HTTP 404.
    pub fn fail_urls_containing(&self, marker: &str) {
        self.failing.lock().unwrap().insert(marker.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Serve a transformer payload reporting a different version than the
    /// one requested.
    pub fn override_transformer_version(&self, version: &str) {
        *self.transformer_version_override.lock().unwrap() = Some(version.to_string());
    }

    fn payload(&self, url: &str) -> String {
        if url.contains("core.client@") {
            "// lumen core esm runtime\nexport const component = () => {};".to_string()
        } else if url.contains("core.server@") {
            "// lumen core server runtime".to_string()
        } else if url.contains("transformer@") {
            match self.transformer_version_override.lock().unwrap().as_deref() {
                Some(version) => format!("VERSION:{version}\n// lumen transformer"),
                None => "// lumen transformer".to_string(),
            }
        } else if url.contains("engine@") {
            "// bundling engine".to_string()
        } else if url.contains("formatter@") {
            "// html formatter".to_string()
        } else if url.contains("minifier@") {
            "// minifier".to_string()
        } else if url.contains("server@") {
            format!(
                "const manifest = {};\nexport const renderToString = (root, opts) => null;",
                lumen_core::manifest::MANIFEST_PLACEHOLDER
            )
        } else {
            format!("// asset {url}")
        }
    }
}

impl AssetFetcher for StubFetcher {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let url = url.as_str();
            let failing = self.failing.lock().unwrap();
            if failing.iter().any(|marker| url.contains(marker.as_str())) {
                return Err(Error::DependencyLoad(format!(
                    "unable to load dependency {url}: HTTP 404"
                )));
            }
            Ok(self.payload(url))
        })
    }
}

/// Transformer that passes sources through and extracts `//#segment NAME`
/// markers into their own dynamic-import modules.
pub struct StubTransformer {
    version: String,
}

fn symbol_hash(name: &str) -> String {
    let hash = name
        .bytes()
        .fold(0x811c_9dc5_u32, |h, b| (h ^ b as u32).wrapping_mul(0x0100_0193));
    format!("{hash:08x}")
}

fn module_stem(path: &str) -> &str {
    let base = path.rsplit('/').next().unwrap_or(path);
    base.split('.').next().unwrap_or(base)
}

impl Transformer for StubTransformer {
    fn version(&self) -> &str {
        &self.version
    }

    fn transform(&self, config: &TransformConfig) -> TransformOutput {
        let mut output = TransformOutput::default();
        for input in &config.src_inputs {
            if input.code.contains("%%%") {
                output.diagnostics.push(Diagnostic::error(format!(
                    "syntax error in {}: unexpected token",
                    input.path
                )));
                continue;
            }

            let stem = module_stem(&input.path);
            let mut code = input.code.clone();
            for line in input.code.lines() {
                let Some(name) = line.strip_prefix("//#segment ") else {
                    continue;
                };
                let name = format!("{stem}_{}", name.trim());
                let segment_path = format!("/{name}.js");
                code.push_str(&format!(
                    "\nexport const {name} = () => import(\"./{name}.js\");"
                ));
                output.modules.push(TransformedModule {
                    path: segment_path,
                    code: format!("export const {name} = () => {{}};"),
                    is_entry: true,
                    symbol: Some(SymbolRef {
                        hash: symbol_hash(&name),
                        name,
                    }),
                });
            }

            output.modules.push(TransformedModule {
                path: input.path.clone(),
                code,
                is_entry: false,
                symbol: None,
            });
        }
        output
    }
}

struct EngineState;

/// Engine that walks the module graph through the plugin pipeline and
/// concatenates loaded code into chunks.
#[derive(Default)]
pub struct StubEngine {
    invocations: AtomicUsize,
    cache_reuses: AtomicUsize,
}

impl StubEngine {
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn cache_reuses(&self) -> usize {
        self.cache_reuses.load(Ordering::SeqCst)
    }
}

fn resolve(plugins: &[&dyn BundlePlugin], spec: &str, importer: Option<&str>) -> Result<Resolution> {
    for plugin in plugins {
        if let Some(resolution) = plugin.resolve_id(spec, importer) {
            return Ok(resolution);
        }
    }
    Err(Error::Bundle(format!("unresolved import {spec}")))
}

fn load(plugins: &[&dyn BundlePlugin], id: &str) -> Result<String> {
    for plugin in plugins {
        if let Some(code) = plugin.load(id) {
            return Ok(code);
        }
    }
    Err(Error::Bundle(format!("could not load module {id}")))
}

fn specifiers_after(code: &str, pattern: &str) -> Vec<String> {
    let mut found = Vec::new();
    for (idx, _) in code.match_indices(pattern) {
        let rest = &code[idx + pattern.len()..];
        let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            continue;
        };
        let rest = &rest[1..];
        if let Some(end) = rest.find(quote) {
            found.push(rest[..end].to_string());
        }
    }
    found
}

fn static_imports(code: &str) -> Vec<String> {
    specifiers_after(code, "from ")
}

fn dynamic_imports(code: &str) -> Vec<String> {
    specifiers_after(code, "import(")
}

struct GraphWalk {
    modules: Vec<(String, String)>,
    dynamic_roots: Vec<String>,
    externals: Vec<String>,
    warnings: Vec<String>,
}

fn walk(
    plugins: &[&dyn BundlePlugin],
    root: String,
    inline_dynamic: bool,
) -> Result<GraphWalk> {
    let mut result = GraphWalk {
        modules: Vec::new(),
        dynamic_roots: Vec::new(),
        externals: Vec::new(),
        warnings: Vec::new(),
    };
    let mut seen = HashSet::new();
    seen.insert(root.clone());
    let mut queue = vec![root];

    while let Some(id) = queue.pop() {
        let code = load(plugins, &id)?;
        if code.contains("TRIGGER_WARNING") {
            result.warnings.push(format!("circular dependency in {id}"));
        }
        if code.contains("TRIGGER_BENIGN") {
            result
                .warnings
                .push("plugin typescript: outputToFilesystem option".to_string());
        }
        for spec in static_imports(&code) {
            match resolve(plugins, &spec, Some(&id))? {
                Resolution::Id(next) => {
                    if seen.insert(next.clone()) {
                        queue.push(next);
                    }
                }
                Resolution::External(external) => result.externals.push(external),
            }
        }
        for spec in dynamic_imports(&code) {
            match resolve(plugins, &spec, Some(&id))? {
                Resolution::Id(next) => {
                    if inline_dynamic {
                        if seen.insert(next.clone()) {
                            queue.push(next);
                        }
                    } else if !result.dynamic_roots.contains(&next) {
                        result.dynamic_roots.push(next);
                    }
                }
                Resolution::External(external) => result.externals.push(external),
            }
        }
        result.modules.push((id, code));
    }
    Ok(result)
}

impl BundleEngine for StubEngine {
    fn version(&self) -> &str {
        ENGINE_VERSION
    }

    fn bundle<'a>(&'a self, job: BundleJob<'a>) -> BoxFuture<'a, Result<BundleOutput>> {
        Box::pin(async move {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if let Some(cache) = &job.cache {
                if cache.downcast_ref::<EngineState>().is_some() {
                    self.cache_reuses.fetch_add(1, Ordering::SeqCst);
                }
            }

            let entry_id = match resolve(job.plugins, job.entry, None)? {
                Resolution::Id(id) => id,
                Resolution::External(spec) => {
                    return Err(Error::Bundle(format!("entry {spec} resolved external")))
                }
            };

            let inline = job.output.inline_dynamic_imports;
            let root_walk = walk(job.plugins, entry_id.clone(), inline)?;
            let mut warnings = root_walk.warnings.clone();

            let mut chunks = Vec::new();
            let mut dynamic_chunk_names = Vec::new();
            for root in &root_walk.dynamic_roots {
                let sub = walk(job.plugins, root.clone(), inline)?;
                warnings.extend(sub.warnings.clone());
                let file_name = format!("{}.js", module_stem(root));
                dynamic_chunk_names.push(file_name.clone());
                chunks.push(OutputChunk {
                    file_name,
                    code: sub
                        .modules
                        .iter()
                        .map(|(_, code)| code.as_str())
                        .collect::<Vec<_>>()
                        .join("\n"),
                    is_dynamic_entry: true,
                    modules: sub.modules.iter().map(|(id, _)| id.clone()).collect(),
                    imports: sub.externals,
                    dynamic_imports: Vec::new(),
                });
            }

            let entry_chunk = OutputChunk {
                file_name: format!("{}.js", module_stem(&entry_id)),
                code: root_walk
                    .modules
                    .iter()
                    .map(|(_, code)| code.as_str())
                    .collect::<Vec<_>>()
                    .join("\n"),
                is_dynamic_entry: false,
                modules: root_walk.modules.iter().map(|(id, _)| id.clone()).collect(),
                imports: root_walk.externals,
                dynamic_imports: dynamic_chunk_names,
            };
            chunks.insert(0, entry_chunk);

            let cache: EngineCache = Arc::new(EngineState) as Arc<dyn Any + Send + Sync>;
            Ok(BundleOutput {
                chunks,
                warnings,
                cache: Some(cache),
            })
        })
    }
}

/// Script runtime rendering the first `<p>…</p>` found in the evaluated
/// bundle.
pub struct StubScriptRuntime {
    version: String,
}

struct StubRenderModule {
    code: String,
}

impl RenderModule for StubRenderModule {
    fn render<'a>(&'a self, options: &'a RenderOptions) -> BoxFuture<'a, Result<RenderOutput>> {
        Box::pin(async move {
            if self.code.contains("THROW_ON_RENDER") {
                return Err(Error::Render("render entry threw".to_string()));
            }
            let mut diagnostics = Vec::new();
            let markup = match (self.code.find("<p>"), self.code.find("</p>")) {
                (Some(start), Some(end)) if start < end => &self.code[start..end + 4],
                _ => {
                    diagnostics.push(Diagnostic::warning("no route matched".to_string()));
                    ""
                }
            };
            Ok(RenderOutput {
                html: format!(
                    "<html><head></head><body><div q:base=\"{}\">{markup}</div></body></html>",
                    options.base
                ),
                diagnostics,
            })
        })
    }
}

impl ScriptRuntime for StubScriptRuntime {
    fn version(&self) -> &str {
        &self.version
    }

    fn evaluate(&self, code: &str) -> Result<Box<dyn RenderModule>> {
        if code.contains("THROW_ON_EVAL") {
            return Err(Error::Render("evaluation failed".to_string()));
        }
        Ok(Box::new(StubRenderModule {
            code: code.to_string(),
        }))
    }
}

pub struct StubFormatter;

impl HtmlFormatter for StubFormatter {
    fn format(&self, html: &str) -> Result<String> {
        if html.contains("UNFORMATTABLE") {
            return Err(Error::Render("formatter choked".to_string()));
        }
        Ok(format!("{html}\n"))
    }
}

pub struct StubMinifier;

impl Minifier for StubMinifier {
    fn minify(&self, _path: &str, code: &str) -> Result<String> {
        Ok(code
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(""))
    }
}

/// Factory installing the stub capability set.
pub struct StubFactory {
    pub engine: Arc<StubEngine>,
}

impl StubFactory {
    pub fn new() -> Self {
        Self {
            engine: Arc::new(StubEngine::default()),
        }
    }
}

fn find_bundle<'a>(bundles: &'a [DependencyBundle], name: &str) -> Result<&'a DependencyBundle> {
    bundles
        .iter()
        .find(|b| b.name == name)
        .ok_or_else(|| Error::DependencyLoad(format!("missing bundle {name}")))
}

impl CapabilityFactory for StubFactory {
    fn required_assets(&self, cdn_base: &Url, version: &str) -> Result<Vec<AssetRequest>> {
        REQUIRED_ASSETS
            .iter()
            .map(|name| {
                let asset_version = match *name {
                    "engine" => ENGINE_VERSION,
                    "formatter" => FORMATTER_VERSION,
                    _ => version,
                };
                Ok(AssetRequest {
                    name: name.to_string(),
                    version: asset_version.to_string(),
                    url: cdn_url(cdn_base, name, asset_version, &format!("/dist/{name}.js"))?,
                })
            })
            .collect()
    }

    fn pinned_engine_version(&self) -> &str {
        ENGINE_VERSION
    }

    fn install(&self, bundles: &[DependencyBundle]) -> Result<CapabilitySet> {
        let transformer = find_bundle(bundles, "transformer")?;
        let transformer_version = transformer
            .code
            .strip_prefix("VERSION:")
            .and_then(|rest| rest.lines().next())
            .unwrap_or(&transformer.version)
            .to_string();
        let server = find_bundle(bundles, "server")?;

        Ok(CapabilitySet {
            transformer: Arc::new(StubTransformer {
                version: transformer_version,
            }),
            engine: self.engine.clone(),
            script_runtime: Arc::new(StubScriptRuntime {
                version: server.version.clone(),
            }),
            formatter: Some(Arc::new(StubFormatter)),
            client_runtime_source: find_bundle(bundles, "core.client")?.code.clone(),
            server_core_source: find_bundle(bundles, "core.server")?.code.clone(),
            server_runtime_source: server.code.clone(),
        })
    }

    fn minifier_request(&self, cdn_base: &Url) -> Result<AssetRequest> {
        Ok(AssetRequest {
            name: "minifier".to_string(),
            version: MINIFIER_VERSION.to_string(),
            url: cdn_url(cdn_base, "minifier", MINIFIER_VERSION, "/dist/minifier.js")?,
        })
    }

    fn install_minifier(&self, _bundle: &DependencyBundle) -> Result<Arc<dyn Minifier>> {
        Ok(Arc::new(StubMinifier))
    }
}

/// A pipeline wired with the stub capabilities, plus handles for
/// inspecting fetch and engine activity.
pub struct TestHarness {
    pub pipeline: BuildPipeline,
    pub fetcher: Arc<StubFetcher>,
    pub engine: Arc<StubEngine>,
}

pub fn harness() -> TestHarness {
    harness_with_config(PipelineConfig::default())
}

pub fn harness_with_config(config: PipelineConfig) -> TestHarness {
    let fetcher = StubFetcher::new();
    let factory = StubFactory::new();
    let engine = factory.engine.clone();
    let loader = DependencyLoader::new(
        Arc::new(factory),
        fetcher.clone(),
        Url::parse("https://cdn.invalid/npm/").unwrap(),
    );
    TestHarness {
        pipeline: BuildPipeline::new(loader, config),
        fetcher,
        engine,
    }
}
