//! Dependency Loader.
//!
//! Fetches and installs the versioned capability set needed to perform
//! transformation and bundling. Loading is idempotent per version: when
//! every capability is present and tagged with the requested version the
//! loader is a no-op. Otherwise the installed set is reset and every
//! required asset is retrieved concurrently; any single failure fails the
//! whole load, because a half-loaded toolchain produces undefined
//! bundling behavior.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use url::Url;

use crate::error::{Error, Result};
use crate::types::{BuildOptions, MinifyMode};

use super::{
    AssetFetcher, AssetRequest, CapabilityFactory, CapabilitySet, DependencyBundle, Minifier,
};

/// Capabilities handed to one build invocation.
#[derive(Clone)]
pub struct LoadedCapabilities {
    pub set: Arc<CapabilitySet>,
    /// Present only after a build requested minification.
    pub minifier: Option<Arc<dyn Minifier>>,
}

/// Process-wide loader for the versioned toolchain.
pub struct DependencyLoader {
    factory: Arc<dyn CapabilityFactory>,
    fetcher: Arc<dyn AssetFetcher>,
    cdn_base: Url,
    /// Fetched payloads keyed by `(name, version)`. Survives capability
    /// resets, so a version is fetched at most once per process lifetime.
    bundle_cache: FxHashMap<(String, String), Arc<str>>,
    installed: Option<(String, Arc<CapabilitySet>)>,
    minifier: Option<Arc<dyn Minifier>>,
}

impl DependencyLoader {
    pub fn new(
        factory: Arc<dyn CapabilityFactory>,
        fetcher: Arc<dyn AssetFetcher>,
        cdn_base: Url,
    ) -> Self {
        Self {
            factory,
            fetcher,
            cdn_base,
            bundle_cache: FxHashMap::default(),
            installed: None,
            minifier: None,
        }
    }

    /// Ensure the capability set for `version` is installed, loading the
    /// minifier lazily when the build options request minification.
    pub async fn ensure(
        &mut self,
        version: &str,
        options: &BuildOptions,
    ) -> Result<LoadedCapabilities> {
        let set = match &self.installed {
            Some((installed_version, set)) if installed_version == version => set.clone(),
            _ => {
                // Reset before fetching; nothing from a failed attempt may
                // remain installed.
                self.installed = None;

                let requests = self.factory.required_assets(&self.cdn_base, version)?;
                tracing::debug!(version, assets = requests.len(), "loading dependencies");
                let bundles = self.fetch_all(&requests).await?;
                let set = self.factory.install(&bundles)?;
                self.verify_versions(&set, version)?;

                let set = Arc::new(set);
                self.installed = Some((version.to_string(), set.clone()));
                tracing::info!(version, "dependencies loaded");
                set
            }
        };

        if options.minify == MinifyMode::Minify && self.minifier.is_none() {
            let request = self.factory.minifier_request(&self.cdn_base)?;
            tracing::debug!(name = %request.name, version = %request.version, "loading minifier");
            let bundle = self.fetch_one(&request).await?;
            self.minifier = Some(self.factory.install_minifier(&bundle)?);
        }

        Ok(LoadedCapabilities {
            set,
            minifier: self.minifier.clone(),
        })
    }

    /// Fan-out fetch of every required asset, fan-in join. Any single
    /// failure fails the whole load; the bundle cache is only updated
    /// after the join succeeds.
    async fn fetch_all(&mut self, requests: &[AssetRequest]) -> Result<Vec<DependencyBundle>> {
        let fetches: Vec<_> = requests
            .iter()
            .map(|request| {
                let cached = self
                    .bundle_cache
                    .get(&(request.name.clone(), request.version.clone()))
                    .cloned();
                let fetcher = self.fetcher.clone();
                async move {
                    let code: Arc<str> = match cached {
                        Some(code) => code,
                        None => fetcher.fetch(&request.url).await?.into(),
                    };
                    Ok::<DependencyBundle, Error>(DependencyBundle {
                        name: request.name.clone(),
                        version: request.version.clone(),
                        code,
                    })
                }
            })
            .collect();

        let bundles = futures::future::try_join_all(fetches).await?;
        for bundle in &bundles {
            self.bundle_cache.insert(
                (bundle.name.clone(), bundle.version.clone()),
                bundle.code.clone(),
            );
        }
        Ok(bundles)
    }

    async fn fetch_one(&mut self, request: &AssetRequest) -> Result<DependencyBundle> {
        let key = (request.name.clone(), request.version.clone());
        let code: Arc<str> = match self.bundle_cache.get(&key) {
            Some(code) => code.clone(),
            None => {
                let code: Arc<str> = self.fetcher.fetch(&request.url).await?.into();
                self.bundle_cache.insert(key, code.clone());
                code
            }
        };
        Ok(DependencyBundle {
            name: request.name.clone(),
            version: request.version.clone(),
            code,
        })
    }

    /// Assert every installed capability reports the version it was loaded
    /// for. The engine is checked against the factory's own pin instead of
    /// the framework version.
    fn verify_versions(&self, set: &CapabilitySet, version: &str) -> Result<()> {
        let framework_tagged = [
            ("transformer", set.transformer.version()),
            ("script runtime", set.script_runtime.version()),
        ];
        for (name, installed) in framework_tagged {
            if installed != version {
                return Err(Error::VersionMismatch {
                    name: name.to_string(),
                    requested: version.to_string(),
                    installed: installed.to_string(),
                });
            }
        }

        let pinned = self.factory.pinned_engine_version();
        if set.engine.version() != pinned {
            return Err(Error::VersionMismatch {
                name: "bundle engine".to_string(),
                requested: pinned.to_string(),
                installed: set.engine.version().to_string(),
            });
        }
        Ok(())
    }
}
