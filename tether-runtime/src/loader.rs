//! Module loading.
//!
//! A module arrives either as raw bytes or as a fetched response. Responses
//! served as `application/wasm` are compiled directly from the binary; any
//! other content type logs a warning and falls back to buffered compilation,
//! which also accepts the text format.

use crate::runtime::{BridgeRuntime, CompileMode, CompiledModule};
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tether_core::error::{BridgeError, Result};

/// MIME type that allows streaming compilation.
pub const WASM_MIME: &str = "application/wasm";

/// Where module bytes came from.
#[derive(Debug, Clone)]
pub enum ModuleSource {
    /// Bytes already in memory.
    Bytes {
        /// Name used for logs and errors.
        name: String,
        /// Module bytes.
        bytes: Bytes,
    },
    /// A fetched response body.
    Response {
        /// Where it was fetched from.
        url: String,
        /// The `Content-Type` header, if any.
        content_type: Option<String>,
        /// Response body.
        body: Bytes,
    },
}

impl ModuleSource {
    /// In-memory bytes.
    pub fn bytes(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self::Bytes {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// A response body with its content type.
    pub fn response(
        url: impl Into<String>,
        content_type: Option<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self::Response {
            url: url.into(),
            content_type,
            body: body.into(),
        }
    }

    /// Name for logs and errors.
    pub fn name(&self) -> &str {
        match self {
            Self::Bytes { name, .. } => name,
            Self::Response { url, .. } => url,
        }
    }

    /// The raw module bytes.
    pub fn body(&self) -> &Bytes {
        match self {
            Self::Bytes { bytes, .. } => bytes,
            Self::Response { body, .. } => body,
        }
    }

    /// Whether the source qualifies for streaming compilation.
    pub fn is_streamable(&self) -> bool {
        match self {
            Self::Bytes { .. } => false,
            Self::Response { content_type, .. } => content_type
                .as_deref()
                .map(mime_essence)
                .is_some_and(|essence| essence.eq_ignore_ascii_case(WASM_MIME)),
        }
    }
}

/// The media type without parameters, e.g. `application/wasm; charset=x`.
fn mime_essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}

/// Compile a module from `source`.
///
/// Streaming compilation failures are reported as is. A response with the
/// wrong content type only warns, then compiles the buffered body.
pub fn load(runtime: &BridgeRuntime, source: &ModuleSource) -> Result<Arc<CompiledModule>> {
    let name = source.name();

    if source.is_streamable() {
        tracing::debug!(module = name, "streaming compilation");
        return runtime.compile_with(name, source.body(), CompileMode::Binary);
    }

    if let ModuleSource::Response { content_type, .. } = source {
        tracing::warn!(
            module = name,
            content_type = content_type.as_deref().unwrap_or("<none>"),
            "response is not served as `{}`, falling back to buffered compilation",
            WASM_MIME
        );
    }

    runtime.compile_with(name, source.body(), CompileMode::Any)
}

/// Read a module from disk.
pub async fn from_path(path: &Path) -> Result<ModuleSource> {
    let bytes = tokio::fs::read(path).await.map_err(|e| BridgeError::Io {
        path: path.display().to_string(),
        cause: e.to_string(),
    })?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    Ok(ModuleSource::bytes(name, bytes))
}

/// Fetch a module over HTTP, keeping the response's content type.
pub async fn fetch_module(url: &str) -> Result<ModuleSource> {
    let network = |e: reqwest::Error| BridgeError::Network {
        url: url.to_string(),
        cause: e.to_string(),
    };

    let response = reqwest::get(url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(network)?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = response.bytes().await.map_err(network)?;

    tracing::debug!(url, content_type = ?content_type, size = body.len(), "module fetched");
    Ok(ModuleSource::response(url, content_type, body))
}
