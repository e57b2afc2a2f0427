//! Core data model shared by the pipeline and its hosts.
//!
//! These types form the wire surface of the build protocol: the worker host
//! serializes them as tagged JSON, the dev server hands them to its
//! middleware. Field names follow the camelCase convention of the REPL
//! protocol.

use serde::{Deserialize, Serialize};

use crate::manifest::Manifest;

/// One source file submitted to a build, identified by an absolute virtual
/// path. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInput {
    pub path: String,
    pub code: String,
}

impl ModuleInput {
    pub fn new(path: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
        }
    }
}

/// One output file produced by a bundling pass, owned by a completed build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledModule {
    pub path: String,
    pub code: String,
    pub is_entry: bool,
}

/// Severity of a build diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// A per-module or per-stage issue accumulated across transformation and
/// bundling. Diagnostics are collected into the build result, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Warning,
        }
    }
}

/// Entry segmentation strategy, passed through to the transformer unmodified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntryStrategy {
    /// Keep every segment inline with its parent module.
    Inline,
    /// One entry for the whole application.
    Single,
    /// One entry per extracted hook.
    #[default]
    Hook,
    /// One entry per component.
    Component,
    /// Let the transformer group segments heuristically.
    Smart,
}

/// Minification mode, passed through to the transformer and applied to
/// client chunks when set to `Minify`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinifyMode {
    Minify,
    Simplify,
    #[default]
    None,
}

/// Build mode, selecting per-target output naming conventions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Development,
    Production,
}

/// Options for one build invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    /// Source modules to build.
    pub src_inputs: Vec<ModuleInput>,

    /// Entry segmentation strategy forwarded to the transformer.
    #[serde(default)]
    pub entry_strategy: EntryStrategy,

    /// Minification mode.
    #[serde(default)]
    pub minify: MinifyMode,

    /// Build mode.
    #[serde(default)]
    pub build_mode: BuildMode,

    /// Emit transformer debug output.
    #[serde(default)]
    pub debug: bool,

    /// Client manifest supplied directly by the host, when the paired
    /// client build ran elsewhere. Takes precedence over the manifest
    /// artifact on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_input: Option<Manifest>,
}

impl BuildOptions {
    /// Options for a development build of the given sources.
    pub fn new(src_inputs: Vec<ModuleInput>) -> Self {
        Self {
            src_inputs,
            entry_strategy: EntryStrategy::default(),
            minify: MinifyMode::default(),
            build_mode: BuildMode::default(),
            debug: false,
            manifest_input: None,
        }
    }
}

/// The unit of output handed back to a host adapter. Exactly one
/// `BuildResult` exists per build invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub client_modules: Vec<CompiledModule>,
    pub server_modules: Vec<CompiledModule>,
    pub diagnostics: Vec<Diagnostic>,
    pub output_html: String,
}

impl BuildResult {
    /// True when any collected diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}
