//! Symbol manifest produced by client builds and consumed by server builds.
//!
//! A client bundling pass yields a symbol→chunk manifest derived from the
//! emitted chunk graph. The paired server bundle is generated before that
//! manifest exists, so the server runtime embeds a placeholder token which
//! is later textually patched with the real manifest (see
//! [`MANIFEST_PLACEHOLDER`]). If no client manifest can be resolved the
//! patch step is skipped and the placeholder ships; that is never fatal.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::bundle::OutputChunk;
use crate::error::Result;
use crate::transform::SymbolRef;

/// File name of the manifest artifact written next to the client build.
pub const MANIFEST_FILENAME: &str = "lumen-manifest.json";

/// Placeholder token embedded in generated server bundles.
///
/// Token grammar: the exact byte sequence `/*@manifest*/null`, the marker
/// comment immediately followed by the JSON literal `null`, no interior
/// whitespace. The server runtime emits it exactly once. Patching replaces
/// the whole token with the marker comment followed by the serialized
/// client manifest, so a patched bundle still parses as a single JSON value
/// after the marker.
pub const MANIFEST_PLACEHOLDER: &str = "/*@manifest*/null";

const MANIFEST_TOKEN_PREFIX: &str = "/*@manifest*/";

/// Metadata for one extracted symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMeta {
    pub display_name: String,
    pub hash: String,
    /// Module id the symbol was extracted from.
    pub origin: String,
}

/// Metadata for one emitted chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMeta {
    pub size: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dynamic_imports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<String>,
}

/// An element injected into the document head at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadInjection {
    pub tag: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl HeadInjection {
    /// A stylesheet link injected into the head.
    pub fn stylesheet(href: impl Into<String>) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert("rel".to_string(), "stylesheet".to_string());
        attributes.insert("href".to_string(), href.into());
        Self {
            tag: "link".to_string(),
            location: "head".to_string(),
            attributes,
        }
    }
}

/// The symbol→chunk mapping plus head-injection metadata produced by a
/// client build and consumed by the paired server build at render time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    #[serde(default)]
    pub symbols: BTreeMap<String, SymbolMeta>,
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub bundles: BTreeMap<String, BundleMeta>,
    #[serde(default)]
    pub injections: Vec<HeadInjection>,
}

impl Manifest {
    /// A manifest is usable by a server build only when it records the
    /// runtime version that produced it.
    pub fn is_valid(&self) -> bool {
        !self.version.is_empty()
    }
}

/// Derives a manifest from the chunk graph of a client bundling pass.
///
/// Pure over its inputs: an empty chunk set yields an empty manifest.
#[derive(Debug, Default)]
pub struct OutputAnalyzer {
    version: String,
    chunks: Vec<ChunkRecord>,
    symbols: FxHashMap<String, SymbolRef>,
    injections: Vec<HeadInjection>,
}

#[derive(Debug)]
struct ChunkRecord {
    file_name: String,
    modules: Vec<String>,
    imports: Vec<String>,
    dynamic_imports: Vec<String>,
    size: usize,
}

impl OutputAnalyzer {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Default::default()
        }
    }

    /// Record one emitted chunk.
    pub fn add_chunk(&mut self, chunk: &OutputChunk) {
        self.chunks.push(ChunkRecord {
            file_name: chunk.file_name.clone(),
            modules: chunk.modules.clone(),
            imports: chunk.imports.clone(),
            dynamic_imports: chunk.dynamic_imports.clone(),
            size: chunk.code.len(),
        });
    }

    /// Record the symbol extracted into the module with the given id.
    pub fn add_symbol(&mut self, module_id: &str, symbol: &SymbolRef) {
        self.symbols.insert(module_id.to_string(), symbol.clone());
    }

    /// Record a head injection discovered during the build.
    pub fn add_injection(&mut self, injection: HeadInjection) {
        self.injections.push(injection);
    }

    /// Derive the manifest from everything recorded so far.
    pub fn generate(&self) -> Manifest {
        let mut manifest = Manifest {
            version: self.version.clone(),
            ..Default::default()
        };

        for chunk in &self.chunks {
            let mut chunk_symbols = Vec::new();
            for module_id in &chunk.modules {
                if let Some(symbol) = self.symbols.get(module_id) {
                    manifest
                        .mapping
                        .insert(symbol.name.clone(), chunk.file_name.clone());
                    manifest.symbols.insert(
                        symbol.name.clone(),
                        SymbolMeta {
                            display_name: symbol.name.clone(),
                            hash: symbol.hash.clone(),
                            origin: module_id.clone(),
                        },
                    );
                    chunk_symbols.push(symbol.name.clone());
                }
            }
            manifest.bundles.insert(
                chunk.file_name.clone(),
                BundleMeta {
                    size: chunk.size,
                    imports: chunk.imports.clone(),
                    dynamic_imports: chunk.dynamic_imports.clone(),
                    symbols: chunk_symbols,
                },
            );
        }

        manifest.injections = self.injections.clone();
        manifest
    }
}

/// Replace the placeholder token in a generated server chunk with the
/// serialized client manifest. Returns `None` when the chunk carries no
/// placeholder.
pub fn patch_manifest(code: &str, manifest: &Manifest) -> Result<Option<String>> {
    if !code.contains(MANIFEST_PLACEHOLDER) {
        return Ok(None);
    }
    let json = serde_json::to_string(manifest)?;
    let patched = code.replace(MANIFEST_PLACEHOLDER, &format!("{MANIFEST_TOKEN_PREFIX}{json}"));
    Ok(Some(patched))
}

/// Read back the manifest previously patched over a placeholder token.
/// Returns `None` for an unpatched bundle (placeholder still present) or a
/// bundle without the token.
pub fn extract_patched(code: &str) -> Option<Manifest> {
    let start = code.find(MANIFEST_TOKEN_PREFIX)? + MANIFEST_TOKEN_PREFIX.len();
    let rest = &code[start..];
    if rest.starts_with("null") {
        return None;
    }
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Manifest>();
    stream.next()?.ok()
}

/// Write the manifest artifact into the artifact directory.
pub fn write_artifact(dir: &Path, manifest: &Manifest) -> Result<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join(MANIFEST_FILENAME);
    fs::write(&path, serde_json::to_string_pretty(manifest)?)?;
    tracing::debug!("wrote manifest artifact to {}", path.display());
    Ok(())
}

/// Read a manifest artifact from the artifact directory. A missing file or
/// a parse failure yields `None`; recovering the manifest is best-effort.
pub fn read_artifact(dir: &Path) -> Option<Manifest> {
    let path = dir.join(MANIFEST_FILENAME);
    let text = fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<Manifest>(&text) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            tracing::debug!("ignoring unreadable manifest artifact {}: {e}", path.display());
            None
        }
    }
}
