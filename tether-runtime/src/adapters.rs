//! Closure adapter registry.
//!
//! Generated glue imports one `__wbindgen_closure_wrapperN(a, b, _) -> handle`
//! function per closure shape. Each import hands the host a guest closure
//! environment; the registry says which trampoline export calls it, which
//! table slot destroys it and whether it may be called more than once.

use crate::host::HostState;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::sync::Arc;
use tether_core::closure::{Closure, ClosureFlavor};
use tether_core::error::{BridgeError, Result};
use wasmtime::{Caller, ExternType, Linker, Module};

/// Prefix shared by all generated closure wrapper imports.
pub const CLOSURE_WRAPPER_PREFIX: &str = "__wbindgen_closure_wrapper";

/// One closure wrapper import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterSpec {
    /// Import name, e.g. `__wbindgen_closure_wrapper101`.
    pub import: String,
    /// Guest export that invokes the closure.
    pub trampoline: String,
    /// Index of the destructor in the guest's function table.
    pub destructor: u32,
    /// Repeatable or single-shot.
    #[serde(default)]
    pub flavor: ClosureFlavor,
}

impl AdapterSpec {
    /// A repeatable adapter.
    pub fn repeatable(
        import: impl Into<String>,
        trampoline: impl Into<String>,
        destructor: u32,
    ) -> Self {
        Self {
            import: import.into(),
            trampoline: trampoline.into(),
            destructor,
            flavor: ClosureFlavor::Repeatable,
        }
    }

    /// A single-shot adapter.
    pub fn single_shot(
        import: impl Into<String>,
        trampoline: impl Into<String>,
        destructor: u32,
    ) -> Self {
        Self {
            flavor: ClosureFlavor::SingleShot,
            ..Self::repeatable(import, trampoline, destructor)
        }
    }
}

/// The set of closure wrapper imports a guest expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdapterRegistry {
    adapters: Vec<AdapterSpec>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an adapter, replacing any existing one for the same import.
    pub fn register(&mut self, spec: AdapterSpec) {
        match self.adapters.iter_mut().find(|a| a.import == spec.import) {
            Some(existing) => *existing = spec,
            None => self.adapters.push(spec),
        }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, spec: AdapterSpec) -> Self {
        self.register(spec);
        self
    }

    /// Look up an adapter by import name.
    pub fn get(&self, import: &str) -> Option<&AdapterSpec> {
        self.adapters.iter().find(|a| a.import == import)
    }

    /// All adapters.
    pub fn iter(&self) -> impl Iterator<Item = &AdapterSpec> {
        self.adapters.iter()
    }

    /// Number of adapters.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Closure wrapper imports of `module` that have no adapter.
    pub fn missing_for(&self, module: &Module, namespace: &str) -> Vec<String> {
        module
            .imports()
            .filter(|i| i.module() == namespace && i.name().starts_with(CLOSURE_WRAPPER_PREFIX))
            .filter(|i| matches!(i.ty(), ExternType::Func(_)))
            .map(|i| i.name().to_string())
            .filter(|name| self.get(name).is_none())
            .collect()
    }

    /// Define every adapter as a host import in `namespace`.
    pub fn define(&self, linker: &mut Linker<HostState>, namespace: &str) -> Result<()> {
        for spec in &self.adapters {
            let trampoline: Arc<str> = Arc::from(spec.trampoline.as_str());
            let destructor = spec.destructor;
            let flavor = spec.flavor;

            linker
                .func_wrap(
                    namespace,
                    &spec.import,
                    move |mut caller: Caller<'_, HostState>, a: u32, b: u32, _hint: u32| -> u32 {
                        let closure = Closure::new(
                            a,
                            b,
                            destructor,
                            Rc::<str>::from(&*trampoline),
                            flavor,
                        );
                        let handle = caller.data_mut().bridge_mut().add(closure);
                        tracing::trace!(handle, env_ptr = a, destructor, "closure wrapped");
                        handle
                    },
                )
                .map_err(|e| BridgeError::WasmHostFunction {
                    function: spec.import.clone(),
                    cause: e.to_string(),
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_replaces_same_import() {
        let mut registry = AdapterRegistry::new();
        registry.register(AdapterSpec::repeatable("__wbindgen_closure_wrapper1", "a", 1));
        registry.register(AdapterSpec::single_shot("__wbindgen_closure_wrapper1", "b", 2));
        assert_eq!(registry.len(), 1);

        let spec = registry.get("__wbindgen_closure_wrapper1").unwrap();
        assert_eq!(spec.trampoline, "b");
        assert_eq!(spec.flavor, ClosureFlavor::SingleShot);
    }

    #[test]
    fn missing_wrappers_are_reported() {
        let wasm = wat::parse_str(
            r#"(module
                (import "wbg" "__wbindgen_closure_wrapper7" (func (param i32 i32 i32) (result i32)))
                (import "wbg" "__wbindgen_closure_wrapper9" (func (param i32 i32 i32) (result i32)))
                (import "wbg" "__wbindgen_object_drop_ref" (func (param i32))))"#,
        )
        .unwrap();
        let engine = wasmtime::Engine::default();
        let module = Module::new(&engine, &wasm).unwrap();

        let registry =
            AdapterRegistry::new().with(AdapterSpec::repeatable("__wbindgen_closure_wrapper7", "t", 0));
        assert_eq!(
            registry.missing_for(&module, "wbg"),
            vec!["__wbindgen_closure_wrapper9".to_string()]
        );
        assert!(registry.missing_for(&module, "env").is_empty());
    }
}
