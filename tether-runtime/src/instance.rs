//! Instance lifecycle.
//!
//! [`BridgeInstance`] owns the store for one guest. It is created with every
//! intrinsic and closure adapter linked in, and becomes usable once
//! [`finalize`](BridgeInstance::finalize) has resolved the guest's exports and
//! run `__wbindgen_start`.

use crate::adapters::AdapterRegistry;
use crate::host::{HostState, create_linker};
use crate::memory::{GuestExports, WasmGuest};
use crate::runtime::{BridgeRuntime, CompiledModule};
use tether_core::bridge::Bridge;
use tether_core::codec;
use tether_core::error::{BridgeError, Result};
use tether_core::guest::{GuestSlice, Word};
use tether_core::value::HostValue;
use wasmtime::{Instance, Linker, Store, Val};

/// A linked guest instance and its bridge state.
pub struct BridgeInstance {
    store: Store<HostState>,
    instance: Instance,
    destructor_table: String,
    finalized: bool,
}

impl BridgeInstance {
    /// Link and instantiate `module`.
    pub fn instantiate(
        runtime: &BridgeRuntime,
        module: &CompiledModule,
        adapters: &AdapterRegistry,
    ) -> Result<Self> {
        Self::instantiate_with(runtime, module, adapters, |_| Ok(()))
    }

    /// Link and instantiate `module`, letting `extend` add embedder imports
    /// (see [`define_catching`](crate::host::define_catching)).
    pub fn instantiate_with<F>(
        runtime: &BridgeRuntime,
        module: &CompiledModule,
        adapters: &AdapterRegistry,
        extend: F,
    ) -> Result<Self>
    where
        F: FnOnce(&mut Linker<HostState>) -> Result<()>,
    {
        let config = runtime.config();
        let namespace = config.import_namespace.as_str();

        let missing = adapters.missing_for(module.module(), namespace);
        if !missing.is_empty() {
            return Err(BridgeError::WasmLoad {
                module: module.name().to_string(),
                cause: format!("no closure adapter registered for {}", missing.join(", ")),
            });
        }

        let mut linker = create_linker(runtime.engine(), namespace)?;
        adapters.define(&mut linker, namespace)?;
        extend(&mut linker)?;

        let mut store = Store::new(runtime.engine(), HostState::new(module.name(), config));
        store.limiter(|state| state.limits());

        if let Some(fuel) = runtime.initial_fuel() {
            store.set_fuel(fuel).map_err(|e| BridgeError::WasmLoad {
                module: module.name().to_string(),
                cause: format!("failed to set fuel: {e}"),
            })?;
        }
        if let Some(deadline) = runtime.epoch_deadline() {
            store.set_epoch_deadline(deadline);
        }

        let instance = linker
            .instantiate(&mut store, module.module())
            .map_err(|e| BridgeError::WasmLoad {
                module: module.name().to_string(),
                cause: format!("{e:#}"),
            })?;

        tracing::debug!(module = module.name(), adapters = adapters.len(), "guest instantiated");

        Ok(Self {
            store,
            instance,
            destructor_table: config.destructor_table.clone(),
            finalized: false,
        })
    }

    /// Resolve exports, invalidate cached views and run `__wbindgen_start`.
    ///
    /// Calling it again is a no-op; the start function runs at most once.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }

        let exports = GuestExports::resolve(&mut self.store, self.instance, &self.destructor_table)?;
        let start = exports.start.clone();

        let state = self.store.data_mut();
        state.set_exports(exports);
        state.bridge_mut().views_mut().invalidate();
        self.finalized = true;

        if let Some(start) = start {
            start
                .call(&mut self.store, ())
                .map_err(|e| BridgeError::WasmExecution {
                    export: "__wbindgen_start".to_string(),
                    cause: format!("{e:#}"),
                })?;
        }

        tracing::debug!(module = self.store.data().name(), "guest finalized");
        Ok(())
    }

    /// Whether [`finalize`](Self::finalize) has run.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// The guest seen through this instance's store.
    pub fn guest(&mut self) -> Result<WasmGuest<&mut Store<HostState>>> {
        WasmGuest::new(&mut self.store)
    }

    /// Bridge state.
    pub fn bridge(&self) -> &Bridge {
        self.store.data().bridge()
    }

    /// Mutable bridge state.
    pub fn bridge_mut(&mut self) -> &mut Bridge {
        self.store.data_mut().bridge_mut()
    }

    /// The underlying store.
    pub fn store(&self) -> &Store<HostState> {
        &self.store
    }

    /// The underlying store, mutably.
    pub fn store_mut(&mut self) -> &mut Store<HostState> {
        &mut self.store
    }

    /// Remaining fuel, when fuel metering is on.
    pub fn remaining_fuel(&self) -> Option<u64> {
        self.store.get_fuel().ok()
    }

    /// Call an export by name.
    pub fn call_export(&mut self, name: &str, args: &[Val]) -> Result<Vec<Val>> {
        self.guest()?.call_export(name, args)
    }

    /// Invoke the closure behind `handle` with `args`.
    pub fn call_closure(&mut self, handle: u32, args: &[Word]) -> Result<()> {
        let closure = self.bridge().closure(handle)?;
        let mut guest = self.guest()?;
        closure.invoke(&mut guest, args)
    }

    /// Drop the host's reference to the closure behind `handle`.
    ///
    /// Retires the handle; returns whether the guest destructor ran.
    pub fn drop_closure(&mut self, handle: u32) -> Result<bool> {
        let closure = self.bridge().closure(handle)?;
        self.bridge_mut().heap_mut().release(handle)?;
        let mut guest = self.guest()?;
        closure.drop_ref(&mut guest)
    }

    /// Take the pending exception, if the guest did not consume it.
    pub fn take_exception(&mut self) -> Option<HostValue> {
        let bridge = self.bridge_mut();
        let handle = bridge.exceptions_mut().take()?;
        bridge.take(handle).ok()
    }

    /// Encode `text` into guest memory.
    pub fn pass_string(&mut self, text: &str) -> Result<GuestSlice> {
        let mut guest = self.guest()?;
        codec::encode(text, &mut guest)
    }

    /// Decode `len` bytes at `ptr` from guest memory.
    pub fn read_string(&mut self, ptr: u32, len: u32) -> Result<String> {
        let mut guest = self.guest()?;
        codec::decode(&mut guest, ptr, len)
    }
}
