//! Top-level build pipeline.
//!
//! Chains the dependency loader, the two bundling passes, manifest
//! assembly and patching, and SSR rendering into one invocation. Fatal
//! errors from any stage are caught here, converted into a single
//! `Error`-severity diagnostic on the result, and logged; the host process
//! never crashes and previously committed artifacts stay servable.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, RwLock};

use crate::bundle::{bundle_app, BundleTarget};
use crate::capability::DependencyLoader;
use crate::context::BuildContext;
use crate::error::Result;
use crate::manifest::{self, HeadInjection, Manifest, OutputAnalyzer};
use crate::render::{render_html, RenderOptions};
use crate::types::{BuildOptions, BuildResult, CompiledModule, Diagnostic, MinifyMode, ModuleInput};

/// Entry path of the client bundling pass.
pub const CLIENT_ENTRY: &str = "/main.tsx";
/// Entry path of the server bundling pass.
pub const SERVER_ENTRY: &str = "/entry.server.tsx";

/// Server entry used when the submitted sources don't provide one.
const DEFAULT_SERVER_ENTRY_CODE: &str = r#"import { renderToString } from '@lumen/core/server';
import Root from '/main.tsx';

export function render(opts) {
  return renderToString(Root, opts);
}
"#;

/// Host-facing pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base URL path the REPL is served under.
    pub base: String,
    /// Directory the manifest artifact is written to, when set.
    pub artifact_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base: "/repl/".to_string(),
            artifact_dir: None,
        }
    }
}

/// The dual-target build pipeline shared by both hosts.
pub struct BuildPipeline {
    loader: Mutex<DependencyLoader>,
    ctx: RwLock<BuildContext>,
    /// Serializes build invocations per process. Request-time artifact
    /// lookups read the context directly and never wait on a build.
    build_lock: Mutex<()>,
    config: PipelineConfig,
}

impl BuildPipeline {
    pub fn new(loader: DependencyLoader, config: PipelineConfig) -> Self {
        Self {
            loader: Mutex::new(loader),
            ctx: RwLock::new(BuildContext::new()),
            build_lock: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Generation of the last committed build.
    pub async fn generation(&self) -> u64 {
        self.ctx.read().await.generation()
    }

    /// Last-good client artifacts, for request-time lookup.
    pub async fn client_modules(&self) -> Arc<Vec<CompiledModule>> {
        self.ctx.read().await.client_modules()
    }

    /// Run one full build. Exactly one [`BuildResult`] is produced per
    /// invocation; fatal stage errors surface as an `Error` diagnostic on
    /// it rather than escaping.
    pub async fn execute(&self, version: &str, options: &BuildOptions) -> BuildResult {
        let _in_flight = self.build_lock.lock().await;

        let started = Instant::now();
        let mut result = BuildResult::default();
        match self.run(version, options, &mut result).await {
            Ok(()) => {
                tracing::info!(
                    version,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "build complete"
                );
            }
            Err(e) => {
                tracing::error!("build failed: {e}");
                result.diagnostics.push(Diagnostic::error(e.to_string()));
            }
        }
        result
    }

    async fn run(
        &self,
        version: &str,
        options: &BuildOptions,
        result: &mut BuildResult,
    ) -> Result<()> {
        let mut options = options.clone();
        if !options.src_inputs.iter().any(|m| m.path == SERVER_ENTRY) {
            options
                .src_inputs
                .push(ModuleInput::new(SERVER_ENTRY, DEFAULT_SERVER_ENTRY_CODE));
        }
        let options = &options;

        let caps = {
            let mut loader = self.loader.lock().await;
            loader.ensure(version, options).await?
        };
        let set = caps.set.clone();

        {
            let mut ctx = self.ctx.write().await;
            ctx.cache_client_runtime(set.client_runtime_source.clone());
        }
        let client_runtime = set.client_runtime_source.clone();
        let engine_cache = self.ctx.read().await.engine_cache();

        // Client and server passes are independent until the manifest
        // patch, which is the hard join point below.
        let mut client_diags = Vec::new();
        let mut server_diags = Vec::new();
        let passes = tokio::try_join!(
            bundle_app(
                &set,
                client_runtime.clone(),
                engine_cache.clone(),
                options,
                &mut client_diags,
                CLIENT_ENTRY,
                BundleTarget::Client,
            ),
            bundle_app(
                &set,
                client_runtime,
                engine_cache,
                options,
                &mut server_diags,
                SERVER_ENTRY,
                BundleTarget::Server,
            ),
        );
        result.diagnostics.append(&mut client_diags);
        result.diagnostics.append(&mut server_diags);
        let (client_pass, server_pass) = passes?;

        if let Some(cache) = client_pass.cache.clone() {
            self.ctx.write().await.set_engine_cache(cache);
        }

        let mut client_modules = client_pass.modules;
        if options.minify == MinifyMode::Minify {
            if let Some(minifier) = &caps.minifier {
                for module in &mut client_modules {
                    module.code = minifier.minify(&module.path, &module.code)?;
                }
            }
        }

        let mut analyzer = OutputAnalyzer::new(version);
        for chunk in &client_pass.chunks {
            analyzer.add_chunk(chunk);
            // Stylesheets stay external to the graph; record them as head
            // injections so the rendered document links them.
            for import in &chunk.imports {
                if import.ends_with(".css") {
                    analyzer.add_injection(HeadInjection::stylesheet(import.clone()));
                }
            }
        }
        for (module_id, symbol) in &client_pass.symbols {
            analyzer.add_symbol(module_id, symbol);
        }
        let manifest = analyzer.generate();
        if let Some(dir) = &self.config.artifact_dir {
            if let Err(e) = manifest::write_artifact(dir, &manifest) {
                tracing::warn!("failed to write manifest artifact: {e}");
            }
        }

        // Client manifest for the server pass: explicit host input first,
        // then the paired client build, then the artifact from a previous
        // build. Unresolvable manifest means the placeholder ships.
        let client_manifest = options
            .manifest_input
            .clone()
            .filter(Manifest::is_valid)
            .or_else(|| Some(manifest).filter(Manifest::is_valid))
            .or_else(|| {
                self.config
                    .artifact_dir
                    .as_deref()
                    .and_then(manifest::read_artifact)
            });

        let mut server_modules = server_pass.modules;
        match &client_manifest {
            Some(client_manifest) => {
                if client_manifest.version != version {
                    result.diagnostics.push(Diagnostic::warning(format!(
                        "client manifest version {} does not match runtime version {version}",
                        client_manifest.version
                    )));
                }
                for module in &mut server_modules {
                    if let Some(patched) = manifest::patch_manifest(&module.code, client_manifest)?
                    {
                        module.code = patched;
                    }
                }
            }
            None => tracing::debug!("no client manifest resolved, placeholder ships"),
        }

        result.client_modules = client_modules.clone();
        result.server_modules = server_modules.clone();

        // Client artifacts are servable from here on even when rendering
        // fails below.
        let generation = {
            let mut ctx = self.ctx.write().await;
            ctx.commit(client_modules);
            ctx.generation()
        };

        let render_options = RenderOptions {
            url: self.config.base.clone(),
            base: self.config.base.clone(),
            manifest: client_manifest,
            debug: options.debug,
            snapshot: true,
        };
        match render_html(&set, &server_modules, &render_options).await {
            Ok(output) => {
                result.output_html = output.html;
                result.diagnostics.extend(output.diagnostics);
            }
            Err(e) => {
                tracing::error!("render failed: {e}");
                result.diagnostics.push(Diagnostic::error(e.to_string()));
            }
        }

        tracing::debug!(generation, "build committed");
        Ok(())
    }
}
