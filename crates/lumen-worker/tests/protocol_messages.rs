//! Integration tests for worker protocol message serialization.
//!
//! The wire format is the REPL protocol: tagged JSON with camelCase
//! fields, `{"type":"update",...}` in and `{"type":"result",...}` out.

use lumen_core::types::{
    BuildOptions, BuildResult, CompiledModule, Diagnostic, EntryStrategy, MinifyMode, ModuleInput,
};
use lumen_worker::protocol::{WorkerRequest, WorkerResponse};

#[test]
fn test_update_request_roundtrip() {
    let request = WorkerRequest::Update {
        version: "0.1.0".to_string(),
        options: BuildOptions::new(vec![ModuleInput::new("/main.tsx", "export {}")]),
    };

    let json = serde_json::to_string(&request).expect("failed to serialize");
    assert!(json.contains(r#""type":"update""#));
    assert!(json.contains(r#""version":"0.1.0""#));
    assert!(json.contains(r#""srcInputs""#));

    let parsed: WorkerRequest = serde_json::from_str(&json).expect("failed to deserialize");
    let WorkerRequest::Update { version, options } = parsed;
    assert_eq!(version, "0.1.0");
    assert_eq!(options.src_inputs.len(), 1);
}

#[test]
fn test_update_request_from_host_json() {
    let json = r#"{
        "type": "update",
        "version": "0.1.0",
        "options": {
            "srcInputs": [{"path": "/main.tsx", "code": "export {}"}],
            "entryStrategy": {"type": "single"},
            "minify": "simplify",
            "debug": true
        }
    }"#;

    let WorkerRequest::Update { version, options } =
        serde_json::from_str(json).expect("failed to parse host message");
    assert_eq!(version, "0.1.0");
    assert_eq!(options.entry_strategy, EntryStrategy::Single);
    assert_eq!(options.minify, MinifyMode::Simplify);
    assert!(options.debug);
}

#[test]
fn test_result_response_wire_format() {
    let response = WorkerResponse::Result {
        result: BuildResult {
            client_modules: vec![CompiledModule {
                path: "main.js".to_string(),
                code: "export {}".to_string(),
                is_entry: false,
            }],
            server_modules: Vec::new(),
            diagnostics: vec![Diagnostic::warning("slow build")],
            output_html: "<html></html>".to_string(),
        },
    };

    let json = serde_json::to_string(&response).expect("failed to serialize");
    assert!(json.contains(r#""type":"result""#));
    assert!(json.contains(r#""clientModules""#));
    assert!(json.contains(r#""serverModules""#));
    assert!(json.contains(r#""outputHtml":"<html></html>""#));
    assert!(json.contains(r#""severity":"Warning""#));

    let parsed: WorkerResponse = serde_json::from_str(&json).expect("failed to deserialize");
    let WorkerResponse::Result { result } = parsed;
    assert_eq!(result.client_modules.len(), 1);
    assert_eq!(result.diagnostics.len(), 1);
}
