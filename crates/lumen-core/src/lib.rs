//! Build pipeline core for the Lumen REPL.
//!
//! This crate provides:
//! - Dependency loading of the versioned toolchain capabilities
//! - A transformer adapter and bundler orchestrator for dual-target
//!   (client + server) builds
//! - Manifest derivation and placeholder patching
//! - SSR execution of the generated server bundle
//! - Request-time artifact lookup over the last successful build
//!
//! The two hosts (the dev-server middleware in `lumen-server` and the
//! message-driven worker in `lumen-worker`) drive [`BuildPipeline`] and
//! consume its [`BuildResult`].

pub mod artifact;
pub mod bundle;
pub mod capability;
pub mod context;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod render;
pub mod transform;
pub mod types;

pub use error::{Error, Result};
pub use pipeline::{BuildPipeline, PipelineConfig, CLIENT_ENTRY, SERVER_ENTRY};
pub use types::{
    BuildMode, BuildOptions, BuildResult, CompiledModule, Diagnostic, EntryStrategy, MinifyMode,
    ModuleInput, Severity,
};
