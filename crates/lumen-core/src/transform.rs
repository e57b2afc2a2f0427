//! Module Transformer Adapter.
//!
//! Wraps the external source-transformation capability as the first stage
//! of a bundling pass. The adapter shapes configuration and forwards
//! diagnostics; it never interprets the transformation internals.

use rustc_hash::FxHashMap;

use crate::bundle::{BundlePlugin, Resolution};
use crate::types::{BuildOptions, Diagnostic, EntryStrategy, MinifyMode, ModuleInput, Severity};

/// Configuration handed to the transformer, passed through from the build
/// options unmodified.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    pub src_inputs: Vec<ModuleInput>,
    pub entry_strategy: EntryStrategy,
    pub minify: MinifyMode,
    pub debug: bool,
    /// Server-vs-client target flag.
    pub is_server: bool,
}

impl TransformConfig {
    /// Shape the per-pass transformer configuration from the build options.
    pub fn from_options(options: &BuildOptions, is_server: bool) -> Self {
        Self {
            src_inputs: options.src_inputs.clone(),
            entry_strategy: options.entry_strategy,
            minify: options.minify,
            debug: options.debug,
            is_server,
        }
    }
}

/// Identity of a symbol the transformer extracted into its own module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRef {
    pub name: String,
    pub hash: String,
}

/// One intermediate module produced by the transformer.
#[derive(Debug, Clone)]
pub struct TransformedModule {
    pub path: String,
    pub code: String,
    pub is_entry: bool,
    /// Set when this module holds a single extracted symbol.
    pub symbol: Option<SymbolRef>,
}

/// Output of one transformation pass.
#[derive(Debug, Clone, Default)]
pub struct TransformOutput {
    pub modules: Vec<TransformedModule>,
    pub diagnostics: Vec<Diagnostic>,
}

/// External source-to-intermediate transformation capability.
pub trait Transformer: Send + Sync {
    /// Version of the installed transformer.
    fn version(&self) -> &str;

    /// Transform the configured sources into intermediate modules plus
    /// diagnostics. Per-module issues are reported as diagnostics, never
    /// as errors.
    fn transform(&self, config: &TransformConfig) -> TransformOutput;
}

/// Bundler plugin serving transformed modules to the bundling engine.
///
/// Runs the transformer once at construction; `resolve_id`/`load` then
/// answer out of the resulting module set.
pub struct TransformPlugin {
    modules: FxHashMap<String, TransformedModule>,
    diagnostics: Vec<Diagnostic>,
}

impl TransformPlugin {
    pub fn new(transformer: &dyn Transformer, config: &TransformConfig) -> Self {
        let output = transformer.transform(config);
        let mut modules = FxHashMap::default();
        for module in output.modules {
            modules.insert(module.path.clone(), module);
        }
        Self {
            modules,
            diagnostics: output.diagnostics,
        }
    }

    /// Diagnostics the transformer reported for this pass.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// True when the transformer reported at least one error.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Module id → extracted symbol, for the manifest builder.
    pub fn symbols(&self) -> FxHashMap<String, SymbolRef> {
        self.modules
            .iter()
            .filter_map(|(path, module)| {
                module.symbol.clone().map(|symbol| (path.clone(), symbol))
            })
            .collect()
    }
}

impl BundlePlugin for TransformPlugin {
    fn name(&self) -> &'static str {
        "lumen-transform"
    }

    fn resolve_id(&self, specifier: &str, importer: Option<&str>) -> Option<Resolution> {
        if self.modules.contains_key(specifier) {
            return Some(Resolution::Id(specifier.to_string()));
        }
        if let Some(importer) = importer {
            let joined = join_relative(importer, specifier)?;
            if self.modules.contains_key(&joined) {
                return Some(Resolution::Id(joined));
            }
        }
        None
    }

    fn load(&self, id: &str) -> Option<String> {
        self.modules.get(id).map(|m| m.code.clone())
    }
}

/// Resolve a `./`-relative specifier against the importer's directory.
fn join_relative(importer: &str, specifier: &str) -> Option<String> {
    let rest = specifier.strip_prefix("./")?;
    let dir = match importer.rfind('/') {
        Some(idx) => &importer[..=idx],
        None => "/",
    };
    Some(format!("{dir}{rest}"))
}
