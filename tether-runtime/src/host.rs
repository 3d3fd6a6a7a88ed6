//! Host intrinsics for guest modules.
//!
//! Registers the `__wbindgen_*` imports the generated glue expects, plus
//! `__tether_log`, under the configured namespace (`wbg` by default). The
//! bodies live in [`tether_core::intrinsics`]; this module only adapts them
//! to wasmtime's calling convention.

use crate::config::RuntimeConfig;
use crate::memory::{GuestExports, WasmGuest};
use tether_core::bridge::Bridge;
use tether_core::codec;
use tether_core::error::{BridgeError, Result};
use tether_core::exception::handle_error;
use tether_core::intrinsics;
use tether_core::value::{HostError, HostObject, HostValue};
use wasmtime::{Caller, FuncType, Linker, StoreLimits, StoreLimitsBuilder, Val, ValType};

/// Log level for `__tether_log`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Trace-level logging (most verbose).
    Trace = 0,
    /// Debug-level logging.
    Debug = 1,
    /// Info-level logging.
    Info = 2,
    /// Warning-level logging.
    Warn = 3,
    /// Error-level logging.
    Error = 4,
}

impl From<u32> for LogLevel {
    fn from(val: u32) -> Self {
        match val {
            0 => Self::Trace,
            1 => Self::Debug,
            2 => Self::Info,
            3 => Self::Warn,
            _ => Self::Error,
        }
    }
}

/// State held in every store.
pub struct HostState {
    name: String,
    bridge: Bridge,
    exports: Option<GuestExports>,
    limits: StoreLimits,
}

impl HostState {
    /// Fresh state for a guest called `name`.
    pub fn new(name: impl Into<String>, config: &RuntimeConfig) -> Self {
        Self {
            name: name.into(),
            bridge: Bridge::new(),
            exports: None,
            limits: StoreLimitsBuilder::new()
                .memory_size(config.max_memory_bytes())
                .build(),
        }
    }

    /// Module name, used in log fields.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bridge state.
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Mutable bridge state.
    pub fn bridge_mut(&mut self) -> &mut Bridge {
        &mut self.bridge
    }

    /// Resolved guest exports, once the instance is finalized.
    pub fn exports(&self) -> Option<&GuestExports> {
        self.exports.as_ref()
    }

    pub(crate) fn set_exports(&mut self, exports: GuestExports) {
        self.exports = Some(exports);
    }

    pub(crate) fn limits(&mut self) -> &mut StoreLimits {
        &mut self.limits
    }
}

/// Register every intrinsic under `namespace`.
pub fn register_host_functions(linker: &mut Linker<HostState>, namespace: &str) -> Result<()> {
    register_heap_functions(linker, namespace)?;
    register_value_functions(linker, namespace)?;
    register_closure_functions(linker, namespace)?;
    register_error_functions(linker, namespace)?;
    register_logging_functions(linker, namespace)?;
    Ok(())
}

fn registration_error(function: &'static str) -> impl FnOnce(wasmtime::Error) -> BridgeError {
    move |e| BridgeError::WasmHostFunction {
        function: function.to_string(),
        cause: e.to_string(),
    }
}

/// Handle table maintenance.
fn register_heap_functions(linker: &mut Linker<HostState>, ns: &str) -> Result<()> {
    linker
        .func_wrap(
            ns,
            "__wbindgen_object_drop_ref",
            |mut caller: Caller<'_, HostState>, handle: u32| -> wasmtime::Result<()> {
                let mut guest = WasmGuest::new(&mut caller)?;
                intrinsics::object_drop_ref(&mut guest, handle)?;
                Ok(())
            },
        )
        .map_err(registration_error("__wbindgen_object_drop_ref"))?;

    linker
        .func_wrap(
            ns,
            "__wbindgen_object_clone_ref",
            |mut caller: Caller<'_, HostState>, handle: u32| -> wasmtime::Result<u32> {
                let mut guest = WasmGuest::new(&mut caller)?;
                Ok(intrinsics::object_clone_ref(&mut guest, handle)?)
            },
        )
        .map_err(registration_error("__wbindgen_object_clone_ref"))?;

    linker
        .func_wrap(
            ns,
            "__wbindgen_memory",
            |mut caller: Caller<'_, HostState>| -> wasmtime::Result<u32> {
                let mut guest = WasmGuest::new(&mut caller)?;
                let memory = guest.exports().memory;
                Ok(guest.state().bridge_mut().add(HostObject::new(memory)))
            },
        )
        .map_err(registration_error("__wbindgen_memory"))?;

    Ok(())
}

/// Register a `handle -> i32` type test backed by an intrinsic.
macro_rules! type_test {
    ($linker:expr, $ns:expr, $name:literal, $test:path) => {
        $linker
            .func_wrap(
                $ns,
                $name,
                |mut caller: Caller<'_, HostState>, handle: u32| -> wasmtime::Result<i32> {
                    let mut guest = WasmGuest::new(&mut caller)?;
                    Ok(i32::from($test(&mut guest, handle)?))
                },
            )
            .map_err(registration_error($name))?;
    };
}

/// Constructing and inspecting primitive values.
fn register_value_functions(linker: &mut Linker<HostState>, ns: &str) -> Result<()> {
    linker
        .func_wrap(
            ns,
            "__wbindgen_string_new",
            |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> wasmtime::Result<u32> {
                let mut guest = WasmGuest::new(&mut caller)?;
                Ok(intrinsics::string_new(&mut guest, ptr, len)?)
            },
        )
        .map_err(registration_error("__wbindgen_string_new"))?;

    linker
        .func_wrap(
            ns,
            "__wbindgen_string_get",
            |mut caller: Caller<'_, HostState>, retptr: u32, handle: u32| -> wasmtime::Result<()> {
                let mut guest = WasmGuest::new(&mut caller)?;
                intrinsics::string_get(&mut guest, retptr, handle)?;
                Ok(())
            },
        )
        .map_err(registration_error("__wbindgen_string_get"))?;

    linker
        .func_wrap(
            ns,
            "__wbindgen_number_new",
            |mut caller: Caller<'_, HostState>, value: f64| -> u32 {
                caller.data_mut().bridge_mut().add(value)
            },
        )
        .map_err(registration_error("__wbindgen_number_new"))?;

    linker
        .func_wrap(
            ns,
            "__wbindgen_number_get",
            |mut caller: Caller<'_, HostState>, retptr: u32, handle: u32| -> wasmtime::Result<()> {
                let mut guest = WasmGuest::new(&mut caller)?;
                intrinsics::number_get(&mut guest, retptr, handle)?;
                Ok(())
            },
        )
        .map_err(registration_error("__wbindgen_number_get"))?;

    linker
        .func_wrap(
            ns,
            "__wbindgen_boolean_get",
            |mut caller: Caller<'_, HostState>, handle: u32| -> wasmtime::Result<i32> {
                let mut guest = WasmGuest::new(&mut caller)?;
                Ok(intrinsics::boolean_get(&mut guest, handle)?)
            },
        )
        .map_err(registration_error("__wbindgen_boolean_get"))?;

    type_test!(linker, ns, "__wbindgen_is_null", intrinsics::is_null);
    type_test!(linker, ns, "__wbindgen_is_undefined", intrinsics::is_undefined);
    type_test!(linker, ns, "__wbindgen_is_object", intrinsics::is_object);
    type_test!(linker, ns, "__wbindgen_is_string", intrinsics::is_string);
    type_test!(linker, ns, "__wbindgen_is_function", intrinsics::is_function);

    linker
        .func_wrap(
            ns,
            "__wbindgen_debug_string",
            |mut caller: Caller<'_, HostState>, retptr: u32, handle: u32| -> wasmtime::Result<()> {
                let mut guest = WasmGuest::new(&mut caller)?;
                intrinsics::debug_string_into(&mut guest, retptr, handle)?;
                Ok(())
            },
        )
        .map_err(registration_error("__wbindgen_debug_string"))?;

    Ok(())
}

/// Guest-side closure drops.
fn register_closure_functions(linker: &mut Linker<HostState>, ns: &str) -> Result<()> {
    linker
        .func_wrap(
            ns,
            "__wbindgen_cb_drop",
            |mut caller: Caller<'_, HostState>, handle: u32| -> wasmtime::Result<i32> {
                let mut guest = WasmGuest::new(&mut caller)?;
                Ok(i32::from(intrinsics::cb_drop(&mut guest, handle)?))
            },
        )
        .map_err(registration_error("__wbindgen_cb_drop"))?;
    Ok(())
}

/// Guest-raised errors. Both imports always trap.
fn register_error_functions(linker: &mut Linker<HostState>, ns: &str) -> Result<()> {
    linker
        .func_wrap(
            ns,
            "__wbindgen_throw",
            |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> wasmtime::Result<()> {
                let mut guest = WasmGuest::new(&mut caller)?;
                Err(intrinsics::throw(&mut guest, ptr, len).into())
            },
        )
        .map_err(registration_error("__wbindgen_throw"))?;

    linker
        .func_wrap(
            ns,
            "__wbindgen_rethrow",
            |mut caller: Caller<'_, HostState>, handle: u32| -> wasmtime::Result<()> {
                let mut guest = WasmGuest::new(&mut caller)?;
                Err(intrinsics::rethrow(&mut guest, handle).into())
            },
        )
        .map_err(registration_error("__wbindgen_rethrow"))?;

    Ok(())
}

/// Guest logging forwarded to `tracing`.
fn register_logging_functions(linker: &mut Linker<HostState>, ns: &str) -> Result<()> {
    // __tether_log(level: u32, msg_ptr: u32, msg_len: u32) -> i32
    // Returns 0 on success, -1 when the message cannot be read.
    linker
        .func_wrap(
            ns,
            "__tether_log",
            |mut caller: Caller<'_, HostState>, level: u32, msg_ptr: u32, msg_len: u32| -> i32 {
                let Ok(mut guest) = WasmGuest::new(&mut caller) else {
                    return -1;
                };
                let msg = match codec::decode(&mut guest, msg_ptr, msg_len) {
                    Ok(msg) => msg,
                    Err(_) => return -1,
                };

                let module = guest.state().name().to_string();
                match LogLevel::from(level) {
                    LogLevel::Trace => tracing::trace!(module = %module, "[WASM] {}", msg),
                    LogLevel::Debug => tracing::debug!(module = %module, "[WASM] {}", msg),
                    LogLevel::Info => tracing::info!(module = %module, "[WASM] {}", msg),
                    LogLevel::Warn => tracing::warn!(module = %module, "[WASM] {}", msg),
                    LogLevel::Error => tracing::error!(module = %module, "[WASM] {}", msg),
                }

                0
            },
        )
        .map_err(registration_error("__tether_log"))?;

    Ok(())
}

/// Define an embedder host function whose failures are delivered to the guest
/// instead of trapping.
///
/// On failure the results are zeroed, the error is stored as a heap value and
/// its handle passed to the guest's `__wbindgen_exn_store`. Guests without
/// that export leave the handle pending for the embedder.
pub fn define_catching<F>(
    linker: &mut Linker<HostState>,
    module: &str,
    name: &str,
    ty: FuncType,
    func: F,
) -> Result<()>
where
    F: Fn(&mut WasmGuest<&mut Caller<'_, HostState>>, &[Val]) -> std::result::Result<Vec<Val>, HostError>
        + Send
        + Sync
        + 'static,
{
    let result_types: Vec<ValType> = ty.results().collect();
    linker
        .func_new(module, name, ty, move |mut caller, params, results| {
            let mut guest = WasmGuest::new(&mut caller)?;
            match handle_error(&mut guest, |g| func(g, params)) {
                Some(values) => {
                    for (slot, value) in results.iter_mut().zip(values) {
                        *slot = value;
                    }
                }
                None => {
                    for (slot, ty) in results.iter_mut().zip(&result_types) {
                        *slot = zero_value(ty);
                    }
                    guest.deliver_exception()?;
                }
            }
            Ok(())
        })
        .map_err(|e| BridgeError::WasmHostFunction {
            function: name.to_string(),
            cause: e.to_string(),
        })?;
    Ok(())
}

fn zero_value(ty: &ValType) -> Val {
    match ty {
        ValType::I64 => Val::I64(0),
        ValType::F32 => Val::F32(0),
        ValType::F64 => Val::F64(0),
        _ => Val::I32(0),
    }
}

/// Create a linker with all intrinsics registered.
pub fn create_linker(engine: &wasmtime::Engine, namespace: &str) -> Result<Linker<HostState>> {
    let mut linker = Linker::new(engine);
    register_host_functions(&mut linker, namespace)?;
    Ok(linker)
}

/// Store `value` and return its handle as a wasm value.
pub fn handle_val(guest: &mut WasmGuest<&mut Caller<'_, HostState>>, value: HostValue) -> Val {
    Val::I32(guest.state().bridge_mut().add(value) as i32)
}
