//! Process-wide build context.
//!
//! Holds the last successful client artifacts, the bundling engine's
//! incremental cache, and the cached client runtime source. Created empty
//! at process start, updated only by builds that bundle cleanly, and never
//! cleared on failure: a failed build leaves the previous good artifacts
//! servable (stale serving).

use std::sync::Arc;

use crate::bundle::EngineCache;
use crate::types::CompiledModule;

#[derive(Default)]
pub struct BuildContext {
    /// Bumped on every commit; lets hosts tell build generations apart.
    generation: u64,
    /// Client artifacts of the last build that bundled without a fatal
    /// error.
    client_modules: Arc<Vec<CompiledModule>>,
    /// Incremental cache handed back to the engine on the next pass.
    engine_cache: Option<EngineCache>,
    /// Client runtime ESM source, loaded once per dependency install and
    /// reused for virtual-module resolution across builds.
    client_runtime_source: Option<Arc<str>>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Last-good client artifacts, shared with request-time lookups.
    pub fn client_modules(&self) -> Arc<Vec<CompiledModule>> {
        self.client_modules.clone()
    }

    pub fn engine_cache(&self) -> Option<EngineCache> {
        self.engine_cache.clone()
    }

    pub fn set_engine_cache(&mut self, cache: EngineCache) {
        self.engine_cache = Some(cache);
    }

    pub fn client_runtime_source(&self) -> Option<Arc<str>> {
        self.client_runtime_source.clone()
    }

    pub fn cache_client_runtime(&mut self, source: Arc<str>) {
        self.client_runtime_source = Some(source);
    }

    /// Commit a successful build's client artifacts and advance the
    /// generation. Failed builds never reach this point.
    pub fn commit(&mut self, client_modules: Vec<CompiledModule>) {
        self.client_modules = Arc::new(client_modules);
        self.generation += 1;
    }
}
