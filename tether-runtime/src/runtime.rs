//! Engine management and module compilation.
//!
//! Provides engine configuration, module compilation and caching so that
//! several instances of the same guest share one compiled module.

use crate::config::RuntimeConfig;
use dashmap::DashMap;
use std::sync::Arc;
use tether_core::error::{BridgeError, Result};
use wasmtime::{Config, Engine, Module};

/// How bytes are turned into a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileMode {
    /// Binary only, as streaming compilation accepts.
    Binary,
    /// Binary or text format.
    Any,
}

/// A compiled module ready for instantiation.
pub struct CompiledModule {
    name: String,
    module: Module,
    hash: u64,
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("name", &self.name)
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

impl CompiledModule {
    /// The name the module was compiled under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying wasmtime module.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Hash of the source bytes.
    pub fn hash(&self) -> u64 {
        self.hash
    }
}

/// Runtime owning the engine and the compiled module cache.
pub struct BridgeRuntime {
    /// The wasmtime engine (thread-safe, can be shared).
    engine: Engine,
    /// Configuration for this runtime.
    config: RuntimeConfig,
    /// Compiled modules by content hash and the mode that accepted them.
    module_cache: DashMap<(u64, CompileMode), Arc<CompiledModule>>,
}

impl BridgeRuntime {
    /// Create a runtime with the given configuration.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let engine = Engine::new(&engine_config(&config)).map_err(|e| BridgeError::WasmLoad {
            module: "engine".to_string(),
            cause: e.to_string(),
        })?;

        tracing::debug!(
            max_memory_pages = config.max_memory_pages,
            fuel = config.fuel_enabled,
            namespace = %config.import_namespace,
            "bridge runtime created"
        );

        Ok(Self {
            engine,
            config,
            module_cache: DashMap::new(),
        })
    }

    /// Create a runtime with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(RuntimeConfig::default())
    }

    /// The wasmtime engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Compile binary or text module bytes, using the cache when enabled.
    pub fn compile(&self, name: &str, bytes: &[u8]) -> Result<Arc<CompiledModule>> {
        self.compile_with(name, bytes, CompileMode::Any)
    }

    /// Compile module bytes with an explicit mode.
    pub fn compile_with(
        &self,
        name: &str,
        bytes: &[u8],
        mode: CompileMode,
    ) -> Result<Arc<CompiledModule>> {
        let hash = hash_bytes(bytes);

        if self.config.cache_modules {
            if let Some(cached) = self.module_cache.get(&(hash, mode)) {
                tracing::trace!(module = name, hash, "module cache hit");
                return Ok(Arc::clone(&cached));
            }
        }

        let module = match mode {
            CompileMode::Binary => Module::from_binary(&self.engine, bytes),
            CompileMode::Any => Module::new(&self.engine, bytes),
        }
        .map_err(|e| BridgeError::WasmLoad {
            module: name.to_string(),
            cause: format!("{e:#}"),
        })?;

        let compiled = Arc::new(CompiledModule {
            name: name.to_string(),
            module,
            hash,
        });

        if self.config.cache_modules {
            self.module_cache.insert((hash, mode), Arc::clone(&compiled));
        }

        tracing::debug!(module = name, hash, ?mode, "module compiled");
        Ok(compiled)
    }

    /// Compile a module from a file.
    pub fn compile_file(&self, path: &std::path::Path) -> Result<Arc<CompiledModule>> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");

        let bytes = std::fs::read(path).map_err(|e| BridgeError::Io {
            path: path.display().to_string(),
            cause: e.to_string(),
        })?;

        self.compile(name, &bytes)
    }

    /// Validate module bytes without caching the result.
    pub fn validate(&self, bytes: &[u8]) -> Result<()> {
        Module::validate(&self.engine, bytes).map_err(|e| BridgeError::WasmLoad {
            module: "validation".to_string(),
            cause: e.to_string(),
        })
    }

    /// Clear the module cache.
    pub fn clear_cache(&self) {
        self.module_cache.clear();
    }

    /// Number of cached modules.
    pub fn cache_size(&self) -> usize {
        self.module_cache.len()
    }

    /// Initial fuel for new stores.
    pub fn initial_fuel(&self) -> Option<u64> {
        self.config.fuel_enabled.then_some(self.config.fuel_amount)
    }

    /// Advance the engine epoch by one tick.
    ///
    /// Stores past their deadline trap at the next function entry or loop
    /// back-edge. Call from a timer thread when epoch interruption is on.
    pub fn increment_epoch(&self) {
        self.engine.increment_epoch();
    }

    /// Epoch deadline for new stores.
    pub fn epoch_deadline(&self) -> Option<u64> {
        self.config
            .epoch_interruption
            .then_some(self.config.epoch_deadline)
    }
}

fn engine_config(config: &RuntimeConfig) -> Config {
    let mut engine = Config::new();
    engine.epoch_interruption(config.epoch_interruption);
    engine.consume_fuel(config.fuel_enabled);
    engine.debug_info(config.debug_info);
    engine.strategy(wasmtime::Strategy::Cranelift);
    engine
}

/// Cache key for module bytes.
fn hash_bytes(bytes: &[u8]) -> u64 {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_MODULE: &str = "(module (memory (export \"memory\") 1))";

    #[test]
    fn runtime_creation() {
        let runtime = BridgeRuntime::with_defaults().unwrap();
        assert_eq!(runtime.cache_size(), 0);
        assert_eq!(runtime.initial_fuel(), None);
    }

    #[test]
    fn fuel_follows_config() {
        let runtime = BridgeRuntime::new(RuntimeConfig::testing()).unwrap();
        assert_eq!(runtime.initial_fuel(), Some(1_000_000));
    }

    #[test]
    fn binary_mode_rejects_text() {
        let runtime = BridgeRuntime::with_defaults().unwrap();
        assert!(runtime.compile("text", EMPTY_MODULE.as_bytes()).is_ok());
        assert!(
            runtime
                .compile_with("text-binary", b"(module)", CompileMode::Binary)
                .is_err()
        );
    }

    #[test]
    fn cache_shares_compiled_modules() {
        let runtime = BridgeRuntime::new(RuntimeConfig::default().with_cache(true)).unwrap();
        let first = runtime.compile("a", EMPTY_MODULE.as_bytes()).unwrap();
        let second = runtime.compile("b", EMPTY_MODULE.as_bytes()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(runtime.cache_size(), 1);

        runtime.clear_cache();
        assert_eq!(runtime.cache_size(), 0);
    }

    #[test]
    fn cached_text_module_is_not_served_to_binary_mode() {
        let runtime = BridgeRuntime::new(RuntimeConfig::default().with_cache(true)).unwrap();
        runtime.compile("text", EMPTY_MODULE.as_bytes()).unwrap();
        assert_eq!(runtime.cache_size(), 1);

        let err = runtime
            .compile_with("text", EMPTY_MODULE.as_bytes(), CompileMode::Binary)
            .unwrap_err();
        assert_eq!(err.code(), "E701");
        assert_eq!(runtime.cache_size(), 1);
    }

    #[test]
    fn hash_bytes_consistency() {
        assert_eq!(hash_bytes(b"abc"), hash_bytes(b"abc"));
        assert_ne!(hash_bytes(b"abc"), hash_bytes(b"abd"));
    }
}
