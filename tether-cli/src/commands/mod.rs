//! CLI command implementations.

pub mod inspect;
pub mod run;
pub mod validate;
pub mod version;

use anyhow::{Context, Result};
use std::path::Path;
use tether_runtime::{BridgeConfig, ModuleSource, fetch_module, from_path};

/// Load the bridge configuration, or defaults when none is given.
pub(crate) fn load_config(path: Option<&str>) -> Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::from_file(Path::new(path))
            .with_context(|| format!("Failed to load bridge config: {}", path)),
        None => Ok(BridgeConfig::default()),
    }
}

/// Read a module from disk or fetch it when `module` is an http(s) URL.
pub(crate) async fn load_source(module: &str) -> Result<ModuleSource> {
    if is_url(module) {
        return fetch_module(module)
            .await
            .with_context(|| format!("Failed to fetch module: {}", module));
    }

    let path = Path::new(module);
    if !path.exists() {
        anyhow::bail!("Module file not found: {}", module);
    }
    from_path(path)
        .await
        .with_context(|| format!("Failed to read module: {}", module))
}

fn is_url(module: &str) -> bool {
    module.starts_with("http://") || module.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_detected() {
        assert!(is_url("https://cdn.example.com/app_bg.wasm"));
        assert!(is_url("http://localhost:8000/app_bg.wasm"));
        assert!(!is_url("./pkg/app_bg.wasm"));
    }

    #[test]
    fn missing_config_uses_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[tokio::test]
    async fn missing_module_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.wasm");
        let err = load_source(path.to_str().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
