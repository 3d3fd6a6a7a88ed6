//! Wasmtime implementation of the bridge's guest seams.
//!
//! [`WasmGuest`] wraps anything that can lend out the store (a `Caller` inside
//! a host function, or `&mut Store` from the embedder) together with the
//! guest's resolved exports, and implements [`GuestMemory`], [`HostContext`]
//! and [`ClosureGuest`] on top of them.

use crate::host::HostState;
use tether_core::bridge::{Bridge, HostContext};
use tether_core::error::{BridgeError, Result};
use tether_core::guest::{ClosureGuest, GuestMemory, Word};
use tether_core::view::ViewCache;
use wasmtime::{AsContextMut, Func, Instance, Memory, Table, TypedFunc, Val};

/// The guest exports the bridge calls into.
#[derive(Clone)]
pub struct GuestExports {
    /// The instance the exports belong to, for trampoline lookup.
    pub instance: Instance,
    /// Linear memory.
    pub memory: Memory,
    /// `__wbindgen_malloc(size) -> ptr`.
    pub malloc: TypedFunc<u32, u32>,
    /// `__wbindgen_realloc(ptr, old, new) -> ptr`.
    pub realloc: Option<TypedFunc<(u32, u32, u32), u32>>,
    /// `__wbindgen_free(ptr, len)`.
    pub free: Option<TypedFunc<(u32, u32), ()>>,
    /// `__wbindgen_exn_store(handle)`.
    pub exn_store: Option<TypedFunc<u32, ()>>,
    /// `__wbindgen_start()`.
    pub start: Option<TypedFunc<(), ()>>,
    /// Function table holding closure destructors.
    pub destructors: Option<Table>,
}

impl GuestExports {
    /// Resolve exports from a freshly created instance.
    ///
    /// `memory` and `__wbindgen_malloc` are required; everything else is
    /// optional but must have the right signature when present. Closure
    /// destructors are looked up in the table exported as `destructor_table`.
    pub fn resolve(
        mut store: impl AsContextMut,
        instance: Instance,
        destructor_table: &str,
    ) -> Result<Self> {
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| missing("memory", "module does not export linear memory"))?;

        let malloc = instance
            .get_typed_func::<u32, u32>(&mut store, "__wbindgen_malloc")
            .map_err(|e| missing("__wbindgen_malloc", e.to_string()))?;

        let realloc = optional_func(&mut store, instance, "__wbindgen_realloc")?;
        let free = optional_func(&mut store, instance, "__wbindgen_free")?;
        let exn_store = optional_func(&mut store, instance, "__wbindgen_exn_store")?;
        let start = optional_func(&mut store, instance, "__wbindgen_start")?;
        let destructors = instance.get_table(&mut store, destructor_table);

        Ok(Self {
            instance,
            memory,
            malloc,
            realloc,
            free,
            exn_store,
            start,
            destructors,
        })
    }
}

fn optional_func<P, R>(
    mut store: impl AsContextMut,
    instance: Instance,
    name: &str,
) -> Result<Option<TypedFunc<P, R>>>
where
    P: wasmtime::WasmParams,
    R: wasmtime::WasmResults,
{
    if instance.get_func(&mut store, name).is_none() {
        return Ok(None);
    }
    instance
        .get_typed_func::<P, R>(&mut store, name)
        .map(Some)
        .map_err(|e| missing(name, e.to_string()))
}

fn missing(export: &str, cause: impl Into<String>) -> BridgeError {
    BridgeError::MissingExport {
        export: export.to_string(),
        cause: cause.into(),
    }
}

/// A guest instance seen through a borrowed store context.
pub struct WasmGuest<C> {
    cx: C,
    exports: GuestExports,
}

impl<C: AsContextMut<Data = HostState>> WasmGuest<C> {
    /// Wrap `cx`. Fails until the instance has been finalized.
    pub fn new(cx: C) -> Result<Self> {
        let exports = cx
            .as_context()
            .data()
            .exports()
            .cloned()
            .ok_or_else(|| BridgeError::NotInitialized {
                cause: "guest exports have not been resolved".to_string(),
            })?;
        Ok(Self { cx, exports })
    }

    /// The resolved exports.
    pub fn exports(&self) -> &GuestExports {
        &self.exports
    }

    /// The store data.
    pub fn state(&mut self) -> &mut HostState {
        self.exports.memory.data_and_store_mut(&mut self.cx).1
    }

    /// Current memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.exports.memory.data_size(&self.cx)
    }

    /// Grow linear memory by `pages`, returning the previous size in pages.
    pub fn grow(&mut self, pages: u64) -> Result<u64> {
        self.exports
            .memory
            .grow(&mut self.cx, pages)
            .map_err(|e| BridgeError::GuestAlloc {
                requested: pages * 64 * 1024,
                cause: e.to_string(),
            })
    }

    /// Forward a pending exception to `__wbindgen_exn_store`.
    ///
    /// Returns whether a handle was delivered; without the export the handle
    /// stays pending.
    pub fn deliver_exception(&mut self) -> Result<bool> {
        let Some(exn_store) = self.exports.exn_store.clone() else {
            return Ok(false);
        };
        let Some(handle) = self.state().bridge_mut().exceptions_mut().take() else {
            return Ok(false);
        };
        exn_store
            .call(&mut self.cx, handle)
            .map_err(|e| BridgeError::ExceptionStore {
                cause: e.to_string(),
            })?;
        tracing::debug!(handle, "exception delivered to guest");
        Ok(true)
    }

    /// Call a guest export by name with untyped values.
    pub fn call_export(&mut self, name: &str, args: &[Val]) -> Result<Vec<Val>> {
        let func = self.func(name)?;
        let mut results = vec![Val::I32(0); func.ty(&self.cx).results().len()];
        func.call(&mut self.cx, args, &mut results)
            .map_err(|e| BridgeError::WasmExecution {
                export: name.to_string(),
                cause: format!("{e:#}"),
            })?;
        Ok(results)
    }

    /// Unwrap into the store context.
    pub fn into_inner(self) -> C {
        self.cx
    }

    fn func(&mut self, name: &str) -> Result<Func> {
        self.exports
            .instance
            .get_func(&mut self.cx, name)
            .ok_or_else(|| missing(name, "no such function export"))
    }
}

impl<C: AsContextMut<Data = HostState>> GuestMemory for WasmGuest<C> {
    fn memory_and_views(&mut self) -> (&mut [u8], &mut ViewCache) {
        let (mem, state) = self.exports.memory.data_and_store_mut(&mut self.cx);
        (mem, state.bridge_mut().views_mut())
    }

    fn malloc(&mut self, size: u32) -> Result<u32> {
        self.exports
            .malloc
            .call(&mut self.cx, size)
            .map_err(|e| BridgeError::GuestAlloc {
                requested: u64::from(size),
                cause: e.to_string(),
            })
    }

    fn realloc(&mut self, ptr: u32, old_size: u32, new_size: u32) -> Result<u32> {
        let realloc = self.exports.realloc.clone().ok_or_else(|| {
            missing("__wbindgen_realloc", "guest does not export a reallocator")
        })?;
        realloc
            .call(&mut self.cx, (ptr, old_size, new_size))
            .map_err(|e| BridgeError::GuestAlloc {
                requested: u64::from(new_size),
                cause: e.to_string(),
            })
    }

    fn free(&mut self, ptr: u32, size: u32) -> Result<()> {
        let Some(free) = self.exports.free.clone() else {
            tracing::trace!(ptr, size, "guest has no free export, leaking");
            return Ok(());
        };
        free.call(&mut self.cx, (ptr, size))
            .map_err(|e| BridgeError::WasmExecution {
                export: "__wbindgen_free".to_string(),
                cause: e.to_string(),
            })
    }

    fn supports_realloc(&self) -> bool {
        self.exports.realloc.is_some()
    }
}

impl<C: AsContextMut<Data = HostState>> HostContext for WasmGuest<C> {
    fn bridge(&mut self) -> &mut Bridge {
        self.state().bridge_mut()
    }
}

impl<C: AsContextMut<Data = HostState>> ClosureGuest for WasmGuest<C> {
    fn invoke_trampoline(
        &mut self,
        trampoline: &str,
        env_ptr: u32,
        env_extra: u32,
        args: &[Word],
    ) -> Result<()> {
        let mut params = Vec::with_capacity(args.len() + 2);
        params.push(Val::I32(env_ptr as i32));
        params.push(Val::I32(env_extra as i32));
        params.extend(args.iter().map(|word| match *word {
            Word::I32(v) => Val::I32(v),
            Word::F64(v) => Val::F64(v.to_bits()),
        }));

        self.call_export(trampoline, &params)
            .map(|_| ())
            .map_err(|e| match e {
                BridgeError::WasmExecution { cause, .. } => BridgeError::Trampoline {
                    trampoline: trampoline.to_string(),
                    cause,
                },
                other => other,
            })
    }

    fn destroy_closure(&mut self, destructor: u32, env_ptr: u32, env_extra: u32) -> Result<()> {
        let table = self
            .exports
            .destructors
            .ok_or_else(|| missing("destructor table", "guest exports no function table"))?;

        let func = table
            .get(&mut self.cx, destructor.into())
            .and_then(|r| r.as_func().flatten().copied())
            .ok_or_else(|| BridgeError::ClosureDestructor {
                destructor,
                cause: "table slot is empty or not a function".to_string(),
            })?;

        func.typed::<(u32, u32), ()>(&self.cx)
            .and_then(|f| f.call(&mut self.cx, (env_ptr, env_extra)))
            .map_err(|e| BridgeError::ClosureDestructor {
                destructor,
                cause: e.to_string(),
            })
    }
}
