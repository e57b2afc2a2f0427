//! Lumen REPL dev server.
//!
//! Long-lived HTTP host for the build pipeline: serves compiled client
//! artifacts, performs incremental SSR rebuilds on demand, and pushes
//! hot-update directives to connected clients.
//!
//! # Architecture
//!
//! - **Middleware**: router plus the SSR fallback handler
//! - **Watcher**: file system monitoring feeding the reload channel
//! - The pipeline itself lives in `lumen-core` and is shared with the
//!   worker host

pub mod error;
pub mod middleware;
pub mod watcher;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};

use lumen_core::pipeline::BuildPipeline;
use lumen_core::types::BuildOptions;

pub use error::{ServerError, ServerResult};
pub use middleware::{AppState, bootstrap_html, create_router, should_skip};
pub use watcher::{FileEvent, FileWatcher, HotUpdate, hot_update};

/// Capacity for the reload broadcast channel. Clients that fall behind
/// simply miss a reload directive and catch the next one.
const RELOAD_CHANNEL_CAPACITY: usize = 16;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Serve the client-only bootstrap instead of SSR rendering.
    pub client_only: bool,
    /// Entry module the client-only bootstrap loads.
    pub dev_entry: String,
    /// Directory watched for hot updates, when set.
    pub watch_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            client_only: false,
            dev_entry: "/entry.dev.tsx".to_string(),
            watch_dir: None,
        }
    }
}

/// Initialize tracing for an embedding host. Respects `RUST_LOG`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Start the dev server in front of the given pipeline.
pub async fn serve(
    pipeline: Arc<BuildPipeline>,
    version: impl Into<String>,
    options: BuildOptions,
    config: ServerConfig,
) -> ServerResult<()> {
    let (reload_tx, _rx) = broadcast::channel(RELOAD_CHANNEL_CAPACITY);

    let state = Arc::new(AppState {
        pipeline,
        version: version.into(),
        options: RwLock::new(options),
        client_only: config.client_only,
        dev_entry: config.dev_entry.clone(),
        reload_tx: reload_tx.clone(),
    });
    let app = create_router(state);

    // Watch the project sources and push hot-update directives.
    let watcher_task = match &config.watch_dir {
        Some(dir) => {
            let mut file_watcher = FileWatcher::new(dir)?;
            let reload_tx = reload_tx.clone();
            Some(tokio::spawn(async move {
                while let Some(event) = file_watcher.recv().await {
                    match event {
                        FileEvent::Modified(path) => {
                            if let Some(update) = hot_update(&path) {
                                tracing::debug!(
                                    "style change in {}, forcing full reload",
                                    path.display()
                                );
                                let _ = reload_tx.send(update);
                            }
                        }
                        FileEvent::Removed(path) => {
                            tracing::warn!("source file removed: {}", path.display());
                        }
                    }
                }
            }))
        }
        None => None,
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", config.host, config.port)))?;

    tracing::info!("starting Lumen dev server at http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Handle Ctrl+C for graceful shutdown.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await?;

    if let Some(task) = watcher_task {
        task.abort();
        let _ = task.await;
    }

    tracing::info!("server shutdown complete");
    Ok(())
}
