//! Wasmtime engine layer for the tether bridge.
//!
//! Compiles and loads guest modules, links the `__wbindgen_*` intrinsics and
//! closure adapters, and drives each instance through finalize.
//!
//! ```ignore
//! use tether_runtime::{BridgeConfig, BridgeInstance, BridgeRuntime, ModuleSource, loader};
//!
//! let config = BridgeConfig::from_file("bridge.yaml".as_ref())?;
//! let runtime = BridgeRuntime::new(config.runtime.clone())?;
//! let source = loader::fetch_module("https://example.com/app_bg.wasm").await?;
//! let module = loader::load(&runtime, &source)?;
//!
//! let mut instance = BridgeInstance::instantiate(&runtime, &module, &config.adapters)?;
//! instance.finalize()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod config;
pub mod host;
pub mod instance;
pub mod loader;
pub mod memory;
pub mod observability;
pub mod runtime;

pub use adapters::{AdapterRegistry, AdapterSpec, CLOSURE_WRAPPER_PREFIX};
pub use config::{BridgeConfig, RuntimeConfig};
pub use host::{HostState, LogLevel, create_linker, define_catching, handle_val};
pub use instance::BridgeInstance;
pub use loader::{ModuleSource, WASM_MIME, fetch_module, from_path, load};
pub use memory::{GuestExports, WasmGuest};
pub use runtime::{BridgeRuntime, CompileMode, CompiledModule};
