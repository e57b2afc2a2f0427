//! HTTP routes and SSR middleware for the Lumen dev server.
//!
//! The fallback handler implements the dev-server contract: compiled
//! client artifacts are claimed first; static-asset-looking paths,
//! internal tooling paths, and explicitly SSR-disabled URLs fall through;
//! everything else gets either the client-only bootstrap or a full SSR
//! render.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use tokio::sync::{RwLock, broadcast};
use tower_http::cors::CorsLayer;
use url::Url;

use lumen_core::artifact::{ARTIFACT_VERSION_HEADER, ArtifactResponse, match_artifact_under_base};
use lumen_core::pipeline::BuildPipeline;
use lumen_core::types::{BuildOptions, BuildResult, Severity};

use crate::watcher::HotUpdate;

/// Application state shared across handlers.
pub struct AppState {
    /// The build pipeline this server fronts.
    pub pipeline: Arc<BuildPipeline>,
    /// Runtime version builds are performed against.
    pub version: String,
    /// Build options, updated by the embedding host when sources change.
    pub options: RwLock<BuildOptions>,
    /// Serve the client-only bootstrap instead of SSR rendering.
    pub client_only: bool,
    /// Entry module the client-only bootstrap loads.
    pub dev_entry: String,
    /// Hot-update directives broadcast to reload sockets.
    pub reload_tx: broadcast::Sender<HotUpdate>,
}

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/__lumen_reload", get(reload_handler))
        .fallback(dev_handler)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Reload WebSocket upgrade handler.
async fn reload_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_reload_socket(socket, state))
}

/// Forward hot-update directives to a connected client.
async fn handle_reload_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut rx = state.reload_tx.subscribe();
    while let Ok(update) = rx.recv().await {
        let Ok(json) = serde_json::to_string(&update) else {
            continue;
        };
        if socket.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
}

/// Fallback handler implementing the SSR middleware contract.
async fn dev_handler(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let path = uri.path();
    let query = uri.query().unwrap_or("");

    if let Some(response) = serve_artifact(&state, path).await {
        return response;
    }

    if should_skip(path, query) {
        // Not ours; fall through to the host's default handling.
        return StatusCode::NOT_FOUND.into_response();
    }

    if state.client_only {
        tracing::debug!("serving client-only bootstrap for {path}");
        return html_response(StatusCode::OK, bootstrap_html(&state.dev_entry));
    }

    tracing::debug!("SSR render for {path}");
    let options = state.options.read().await.clone();
    let result = state.pipeline.execute(&state.version, &options).await;
    if result.has_errors() {
        return html_response(StatusCode::INTERNAL_SERVER_ERROR, error_page(&result));
    }
    html_response(StatusCode::OK, result.output_html)
}

/// Serve a compiled client chunk when the artifact matcher claims the path.
async fn serve_artifact(state: &AppState, path: &str) -> Option<Response> {
    let modules = state.pipeline.client_modules().await;
    if modules.is_empty() {
        return None;
    }
    let base = Url::parse("http://localhost/").ok()?;
    let request = base.join(path).ok()?;
    let module = match_artifact_under_base(&modules, &base, &request)?;
    let artifact = ArtifactResponse::new(module, &state.version);
    Some(
        (
            StatusCode::OK,
            [
                ("content-type", artifact.content_type.to_string()),
                ("cache-control", artifact.cache_control.to_string()),
                (ARTIFACT_VERSION_HEADER, artifact.version.clone()),
            ],
            artifact.code,
        )
            .into_response(),
    )
}

/// Paths the SSR middleware leaves to the host: static-asset-looking
/// requests, internal tooling paths, and explicitly SSR-disabled URLs.
pub fn should_skip(path: &str, query: &str) -> bool {
    has_extension(path)
        || path.starts_with("/@")
        || path.contains("__lumen_ping")
        || query.contains("ssr=false")
}

fn has_extension(path: &str) -> bool {
    match path.rfind('.') {
        Some(idx) => {
            let ext = &path[idx + 1..];
            !ext.is_empty()
                && !ext.contains('/')
                && ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

fn html_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [
            ("content-type", "text/html; charset=utf-8"),
            ("cache-control", "no-cache"),
            ("access-control-allow-origin", "*"),
            ("x-powered-by", "Lumen Dev Server"),
        ],
        body,
    )
        .into_response()
}

/// Bootstrap page for client-only dev mode: no portion of the application
/// is pre-rendered, everything boots in the browser.
pub fn bootstrap_html(entry: &str) -> String {
    format!(
        r#"<!-- Lumen Dev Mode -->
<!DOCTYPE html>
<html>
  <head></head>
  <body>
    <script type="module" src="{entry}?lumen-dev-client="></script>
  </body>
</html>
"#
    )
}

/// Developer-facing error page carrying the build diagnostics.
fn error_page(result: &BuildResult) -> String {
    let mut items = String::new();
    for diagnostic in result
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
    {
        items.push_str(&format!(
            "      <li><pre>{}</pre></li>\n",
            escape_html(&diagnostic.message)
        ));
    }
    format!(
        r#"<!DOCTYPE html>
<html>
  <head><title>Lumen build failed</title></head>
  <body>
    <h1>Build failed</h1>
    <ul>
{items}    </ul>
  </body>
</html>
"#
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
