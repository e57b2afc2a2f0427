//! Capability seams around the external toolchain.
//!
//! The pipeline depends on a set of versioned toolchain components it does
//! not implement: a source transformer, a bundling engine, a script
//! runtime for executing generated server bundles, an HTML formatter, and
//! an optional minifier. Each sits behind a trait and is installed from
//! fetched dependency bundles by a typed [`CapabilityFactory`]; fetched
//! payload text is never executed in the host's own scope, it only
//! survives as data (the virtual-module source texts).

mod loader;

pub use loader::{DependencyLoader, LoadedCapabilities};

use std::sync::Arc;

use futures::future::BoxFuture;
use url::Url;

use crate::bundle::BundleEngine;
use crate::error::{Error, Result};
use crate::render::{HtmlFormatter, ScriptRuntime};
use crate::transform::Transformer;

/// A versioned runtime/tooling bundle fetched from the dependency CDN.
#[derive(Debug, Clone)]
pub struct DependencyBundle {
    pub name: String,
    pub version: String,
    pub code: Arc<str>,
}

/// A fetch request for one required asset. The version is per-asset: the
/// bundling engine and formatter carry their own pins, independent of the
/// framework version.
#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub name: String,
    pub version: String,
    pub url: Url,
}

/// Network access used by the dependency loader. Injected so hosts and
/// tests control how assets are retrieved.
pub trait AssetFetcher: Send + Sync {
    /// Fetch the asset at `url`. Any non-success response is a
    /// [`Error::DependencyLoad`] failure.
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<String>>;
}

/// reqwest-backed fetcher used by both hosts.
#[derive(Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssetFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| Error::DependencyLoad(format!("unable to load dependency {url}: {e}")))?;
            if !response.status().is_success() {
                return Err(Error::DependencyLoad(format!(
                    "unable to load dependency {url}: HTTP {}",
                    response.status()
                )));
            }
            response
                .text()
                .await
                .map_err(|e| Error::DependencyLoad(format!("unable to load dependency {url}: {e}")))
        })
    }
}

/// Optional minification capability, loaded lazily when a build requests
/// minification.
pub trait Minifier: Send + Sync {
    fn minify(&self, path: &str, code: &str) -> Result<String>;
}

/// The full set of installed capabilities for one framework version.
#[derive(Clone)]
pub struct CapabilitySet {
    pub transformer: Arc<dyn Transformer>,
    pub engine: Arc<dyn BundleEngine>,
    pub script_runtime: Arc<dyn ScriptRuntime>,
    /// HTML pretty-printer; absent formatter means raw markup ships.
    pub formatter: Option<Arc<dyn HtmlFormatter>>,
    /// ESM source of the client-side core runtime, loaded for the virtual
    /// core id in client builds. Cached in the build context across builds.
    pub client_runtime_source: Arc<str>,
    /// Server-flavored core runtime source, loaded for the virtual core id
    /// in server builds.
    pub server_core_source: Arc<str>,
    /// SSR runtime library source, loaded for the virtual server id in
    /// server builds.
    pub server_runtime_source: Arc<str>,
}

/// Typed installer turning fetched dependency bundles into capabilities.
///
/// The factory owns the asset layout for a framework version: which assets
/// exist, where they live on the CDN, and how each payload becomes a typed
/// capability.
pub trait CapabilityFactory: Send + Sync {
    /// Assets that must all be retrieved before any capability installs.
    fn required_assets(&self, cdn_base: &Url, version: &str) -> Result<Vec<AssetRequest>>;

    /// The bundling-engine version this factory is pinned to.
    fn pinned_engine_version(&self) -> &str;

    /// Install the full capability set from the fetched bundles.
    fn install(&self, bundles: &[DependencyBundle]) -> Result<CapabilitySet>;

    /// Fetch request for the optional minifier.
    fn minifier_request(&self, cdn_base: &Url) -> Result<AssetRequest>;

    /// Install the minifier from its fetched bundle.
    fn install_minifier(&self, bundle: &DependencyBundle) -> Result<Arc<dyn Minifier>>;
}

/// Build a versioned, content-addressed-by-version CDN URL for one asset.
pub fn cdn_url(base: &Url, name: &str, version: &str, path: &str) -> Result<Url> {
    Url::parse(&format!("{base}{name}@{version}{path}"))
        .map_err(|e| Error::DependencyLoad(format!("invalid dependency URL for {name}: {e}")))
}
