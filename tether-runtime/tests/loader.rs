//! Loading guests from disk and from responses.

mod common;

use common::{GUEST_WAT, adapters, get_i32, runtime};
use tether_runtime::{
    BridgeInstance, BridgeRuntime, ModuleSource, RuntimeConfig, WASM_MIME, fetch_module, from_path,
    load,
};

#[tokio::test]
async fn module_from_path_instantiates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("guest.wat");
    tokio::fs::write(&path, GUEST_WAT).await.unwrap();

    let source = from_path(&path).await.unwrap();
    assert_eq!(source.name(), "guest.wat");
    assert!(!source.is_streamable());

    let runtime = runtime();
    let module = load(&runtime, &source).unwrap();
    let mut instance = BridgeInstance::instantiate(&runtime, &module, &adapters()).unwrap();
    instance.finalize().unwrap();
    assert_eq!(get_i32(&mut instance, "started"), 1);
}

#[tokio::test]
async fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = from_path(&dir.path().join("absent.wasm")).await.unwrap_err();
    assert_eq!(err.code(), "E901");
}

#[tokio::test]
async fn unreachable_url_is_network_error() {
    let err = fetch_module("http://127.0.0.1:1/guest.wasm").await.unwrap_err();
    assert_eq!(err.code(), "E902");
}

#[test]
fn text_plain_response_falls_back_to_buffered_compile() {
    let runtime = runtime();
    let source = ModuleSource::response(
        "http://localhost/guest.wat",
        Some("text/plain; charset=utf-8".to_string()),
        GUEST_WAT.as_bytes().to_vec(),
    );

    let module = load(&runtime, &source).unwrap();
    let mut instance = BridgeInstance::instantiate(&runtime, &module, &adapters()).unwrap();
    instance.finalize().unwrap();
    assert_eq!(get_i32(&mut instance, "started"), 1);
}

#[test]
fn wasm_response_compiles_binary() {
    let runtime = runtime();
    let binary = wat::parse_str(GUEST_WAT).unwrap();
    let source = ModuleSource::response(
        "http://localhost/guest.wasm",
        Some(WASM_MIME.to_string()),
        binary,
    );
    assert!(source.is_streamable());
    assert!(load(&runtime, &source).is_ok());
}

#[test]
fn wasm_response_with_bad_body_is_an_error() {
    let runtime = runtime();
    let source = ModuleSource::response(
        "http://localhost/guest.wasm",
        Some(WASM_MIME.to_string()),
        GUEST_WAT.as_bytes().to_vec(),
    );
    assert_eq!(load(&runtime, &source).unwrap_err().code(), "E701");
}

#[test]
fn buffered_compile_does_not_satisfy_a_later_wasm_response() {
    let runtime = BridgeRuntime::new(RuntimeConfig::default().with_cache(true)).unwrap();
    let body = GUEST_WAT.as_bytes().to_vec();
    let streamed = ModuleSource::response(
        "http://localhost/guest.wasm",
        Some(WASM_MIME.to_string()),
        body.clone(),
    );
    let buffered = ModuleSource::response(
        "http://localhost/guest.wat",
        Some("text/plain".to_string()),
        body,
    );

    assert_eq!(load(&runtime, &streamed).unwrap_err().code(), "E701");
    assert!(load(&runtime, &buffered).is_ok());
    assert_eq!(runtime.cache_size(), 1);
    assert_eq!(load(&runtime, &streamed).unwrap_err().code(), "E701");
}
