//! Inspect command - show what a guest imports and exports.

use super::{load_config, load_source};
use anyhow::{Context, Result};
use tether_runtime::{BridgeConfig, BridgeRuntime, HostState, ModuleSource, create_linker, load};
use wasmtime::{ExternType, Store};

/// Exports the bridge looks for at finalize.
const BRIDGE_EXPORTS: &[&str] = &[
    "memory",
    "__wbindgen_malloc",
    "__wbindgen_realloc",
    "__wbindgen_free",
    "__wbindgen_exn_store",
    "__wbindgen_start",
];

/// Run the inspect command.
pub async fn run(module: &str, config: Option<&str>) -> Result<()> {
    tracing::info!(module = %module, "Inspecting guest");

    let config = load_config(config)?;
    let source = load_source(module).await?;
    let report = inspect(&config, &source)?;

    println!("Module: {}", report.module);
    println!("======={}", "=".repeat(report.module.len()));
    println!();

    println!("Imports ({}):", report.imports.len());
    for (module, name, kind) in &report.imports {
        println!("  {}::{} ({})", module, name, kind);
    }
    println!();

    println!("Exports ({}):", report.exports.len());
    for (name, kind) in &report.exports {
        let marker = if BRIDGE_EXPORTS.contains(&name.as_str()) {
            " [bridge]"
        } else {
            ""
        };
        println!("  {} ({}){}", name, kind, marker);
    }
    println!();

    if report.missing_adapters.is_empty() && report.unresolved.is_empty() {
        println!("✓ All imports are provided by the host");
    } else {
        for name in &report.missing_adapters {
            println!("✗ No closure adapter for {}", name);
        }
        for name in &report.unresolved {
            println!("✗ Unresolved import {}", name);
        }
    }

    Ok(())
}

/// Summary of a module's interface against the host.
#[derive(Debug, Default)]
pub struct InspectReport {
    /// Module name.
    pub module: String,
    /// `(module, name, kind)` per import.
    pub imports: Vec<(String, String, &'static str)>,
    /// `(name, kind)` per export.
    pub exports: Vec<(String, &'static str)>,
    /// Closure wrapper imports without an adapter.
    pub missing_adapters: Vec<String>,
    /// Other imports neither intrinsics nor adapters satisfy.
    pub unresolved: Vec<String>,
}

/// Compile `source` and compare its imports with what the host links.
pub fn inspect(config: &BridgeConfig, source: &ModuleSource) -> Result<InspectReport> {
    let runtime =
        BridgeRuntime::new(config.runtime.clone()).context("Failed to create runtime")?;
    let compiled = load(&runtime, source).context("Failed to compile module")?;
    let module = compiled.module();
    let namespace = config.runtime.import_namespace.as_str();

    let mut linker = create_linker(runtime.engine(), namespace)?;
    config.adapters.define(&mut linker, namespace)?;
    let mut store = Store::new(
        runtime.engine(),
        HostState::new(compiled.name(), &config.runtime),
    );

    let missing_adapters = config.adapters.missing_for(module, namespace);
    let unresolved = module
        .imports()
        .filter(|import| !missing_adapters.iter().any(|m| m == import.name()))
        .filter(|import| linker.get_by_import(&mut store, import).is_none())
        .map(|import| format!("{}::{}", import.module(), import.name()))
        .collect();

    Ok(InspectReport {
        module: compiled.name().to_string(),
        imports: module
            .imports()
            .map(|i| (i.module().to_string(), i.name().to_string(), kind(&i.ty())))
            .collect(),
        exports: module
            .exports()
            .map(|e| (e.name().to_string(), kind(&e.ty())))
            .collect(),
        missing_adapters,
        unresolved,
    })
}

fn kind(ty: &ExternType) -> &'static str {
    match ty {
        ExternType::Func(_) => "func",
        ExternType::Global(_) => "global",
        ExternType::Table(_) => "table",
        ExternType::Memory(_) => "memory",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUEST: &str = r#"
(module
  (import "wbg" "__wbindgen_object_drop_ref" (func (param i32)))
  (import "wbg" "__wbindgen_closure_wrapper12" (func (param i32 i32 i32) (result i32)))
  (import "env" "now" (func (result f64)))
  (memory (export "memory") 1)
  (func (export "__wbindgen_malloc") (param i32) (result i32) (i32.const 0))
)
"#;

    #[test]
    fn reports_unsatisfied_imports() {
        let source = ModuleSource::bytes("guest.wat", GUEST.as_bytes().to_vec());
        let report = inspect(&BridgeConfig::default(), &source).unwrap();

        assert_eq!(report.imports.len(), 3);
        assert_eq!(report.exports.len(), 2);
        assert_eq!(
            report.missing_adapters,
            vec!["__wbindgen_closure_wrapper12".to_string()]
        );
        assert_eq!(report.unresolved, vec!["env::now".to_string()]);
    }
}
