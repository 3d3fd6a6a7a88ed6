//! Runtime and bridge configuration.

use crate::adapters::AdapterRegistry;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tether_core::error::{BridgeError, Result};

/// Default maximum memory pages (64 KB per page).
const DEFAULT_MAX_MEMORY_PAGES: u32 = 1024; // 64 MB

/// Default fuel amount for execution limiting.
const DEFAULT_FUEL: u64 = 10_000_000;

/// Epoch ticks a store may run before it is interrupted.
const DEFAULT_EPOCH_DEADLINE: u64 = 1;

/// Namespace the generated glue imports intrinsics from.
pub const DEFAULT_IMPORT_NAMESPACE: &str = "wbg";

/// Export holding closure destructors.
pub const DEFAULT_DESTRUCTOR_TABLE: &str = "__wbindgen_export_2";

/// Configuration for the engine and for each store it creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum memory pages allowed (64 KB per page).
    pub max_memory_pages: u32,
    /// Whether to enable fuel-based execution limiting.
    pub fuel_enabled: bool,
    /// Initial fuel amount when fuel is enabled.
    pub fuel_amount: u64,
    /// Whether to enable epoch-based interruption for timeouts.
    ///
    /// The embedder drives the clock with [`BridgeRuntime::increment_epoch`];
    /// without ticks the deadline never fires.
    ///
    /// [`BridgeRuntime::increment_epoch`]: crate::BridgeRuntime::increment_epoch
    pub epoch_interruption: bool,
    /// Ticks before an epoch interrupt fires.
    pub epoch_deadline: u64,
    /// Whether to cache compiled modules.
    pub cache_modules: bool,
    /// Enable debug info in compiled modules.
    pub debug_info: bool,
    /// Import module name for intrinsics and adapters.
    pub import_namespace: String,
    /// Export name of the destructor table.
    pub destructor_table: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_memory_pages: DEFAULT_MAX_MEMORY_PAGES,
            fuel_enabled: false,
            fuel_amount: DEFAULT_FUEL,
            epoch_interruption: false,
            epoch_deadline: DEFAULT_EPOCH_DEADLINE,
            cache_modules: true,
            debug_info: false,
            import_namespace: DEFAULT_IMPORT_NAMESPACE.to_string(),
            destructor_table: DEFAULT_DESTRUCTOR_TABLE.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration optimized for production use.
    ///
    /// Enables epoch interruption, so the embedder must tick the runtime.
    pub fn production() -> Self {
        Self {
            epoch_interruption: true,
            ..Self::default()
        }
    }

    /// Create a configuration for testing with stricter limits.
    pub fn testing() -> Self {
        Self {
            max_memory_pages: 256, // 16 MB
            fuel_enabled: true,
            fuel_amount: 1_000_000,
            cache_modules: false,
            debug_info: true,
            ..Self::default()
        }
    }

    /// Set maximum memory pages.
    pub fn with_max_memory_pages(mut self, pages: u32) -> Self {
        self.max_memory_pages = pages;
        self
    }

    /// Enable or disable fuel-based limiting.
    pub fn with_fuel(mut self, enabled: bool, amount: u64) -> Self {
        self.fuel_enabled = enabled;
        self.fuel_amount = amount;
        self
    }

    /// Enable or disable epoch interruption.
    pub fn with_epoch_interruption(mut self, enabled: bool, deadline: u64) -> Self {
        self.epoch_interruption = enabled;
        self.epoch_deadline = deadline;
        self
    }

    /// Enable or disable module caching.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_modules = enabled;
        self
    }

    /// Use a different import namespace.
    pub fn with_import_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.import_namespace = namespace.into();
        self
    }

    /// Maximum linear memory size in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_pages as usize * 64 * 1024
    }

    /// Check for values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_memory_pages == 0 {
            return Err(config_error("max_memory_pages", "must be at least 1"));
        }
        if self.fuel_enabled && self.fuel_amount == 0 {
            return Err(config_error("fuel_amount", "must be positive when fuel is enabled"));
        }
        if self.import_namespace.is_empty() {
            return Err(config_error("import_namespace", "must not be empty"));
        }
        Ok(())
    }
}

/// Everything needed to host one kind of guest: engine settings plus the
/// closure adapters its glue imports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Engine and store settings.
    pub runtime: RuntimeConfig,
    /// Closure adapter imports.
    pub adapters: AdapterRegistry,
}

impl BridgeConfig {
    /// Parse from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| config_error("yaml", e.to_string()))?;
        config.runtime.validate()?;
        Ok(config)
    }

    /// Load from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BridgeError::Io {
            path: path.display().to_string(),
            cause: e.to_string(),
        })?;
        Self::from_yaml_str(&text)
    }

    /// Serialize to YAML text.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| config_error("yaml", e.to_string()))
    }
}

fn config_error(field: &str, cause: impl Into<String>) -> BridgeError {
    BridgeError::Config {
        field: field.to_string(),
        cause: cause.into(),
    }
}
