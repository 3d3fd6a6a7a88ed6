//! Run command - load, instantiate and finalize a guest.

use super::{load_config, load_source};
use anyhow::{Context, Result};
use tether_core::debug::debug_string;
use tether_runtime::{BridgeConfig, BridgeInstance, BridgeRuntime, ModuleSource, load};
use wasmtime::Val;

/// Run the run command.
pub async fn run(module: &str, config: Option<&str>, invoke: Option<&str>) -> Result<()> {
    tracing::info!(module = %module, "Running guest");

    let config = load_config(config)?;
    let source = load_source(module).await?;
    let report = execute(&config, &source, invoke)?;

    println!("Guest: {}", report.module);
    println!("  Memory:        {} bytes", report.memory_bytes);
    println!("  Live handles:  {}", report.live_handles);
    if let Some(fuel) = report.remaining_fuel {
        println!("  Fuel left:     {}", fuel);
    }
    if let Some(results) = &report.results {
        println!("  Results:       {}", results.join(", "));
    }
    if let Some(exception) = &report.exception {
        println!("  Exception:     {}", exception);
    }

    Ok(())
}

/// What a run left behind.
#[derive(Debug)]
pub struct RunReport {
    /// Module name.
    pub module: String,
    /// Linear memory size after the run.
    pub memory_bytes: usize,
    /// Handles still live in the slot table.
    pub live_handles: usize,
    /// Fuel left, when metering is on.
    pub remaining_fuel: Option<u64>,
    /// Values returned by the invoked export.
    pub results: Option<Vec<String>>,
    /// Pending exception the guest did not consume.
    pub exception: Option<String>,
}

/// Instantiate and finalize `source`, then optionally call `invoke`.
pub fn execute(
    config: &BridgeConfig,
    source: &ModuleSource,
    invoke: Option<&str>,
) -> Result<RunReport> {
    let runtime =
        BridgeRuntime::new(config.runtime.clone()).context("Failed to create runtime")?;
    let module = load(&runtime, source).context("Failed to compile module")?;

    let mut instance = BridgeInstance::instantiate(&runtime, &module, &config.adapters)
        .context("Failed to instantiate module")?;
    instance.finalize().context("Failed to finalize module")?;

    let results = match invoke {
        Some(export) => {
            let values = instance
                .call_export(export, &[])
                .with_context(|| format!("Export '{}' failed", export))?;
            Some(values.iter().map(format_val).collect())
        }
        None => None,
    };

    let exception = instance.take_exception().map(|value| debug_string(&value));
    let memory_bytes = instance.guest()?.memory_size();

    Ok(RunReport {
        module: module.name().to_string(),
        memory_bytes,
        live_handles: instance.bridge().heap().live_count(),
        remaining_fuel: instance.remaining_fuel(),
        results,
        exception,
    })
}

fn format_val(val: &Val) -> String {
    match val {
        Val::I32(v) => v.to_string(),
        Val::I64(v) => v.to_string(),
        Val::F32(bits) => f32::from_bits(*bits).to_string(),
        Val::F64(bits) => f64::from_bits(*bits).to_string(),
        other => format!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUEST: &str = r#"
(module
  (memory (export "memory") 1)
  (global $started (mut i32) (i32.const 0))
  (func (export "__wbindgen_malloc") (param i32) (result i32) (i32.const 1024))
  (func (export "__wbindgen_start") (global.set $started (i32.const 1)))
  (func (export "answer") (result i32) (i32.add (global.get $started) (i32.const 41)))
)
"#;

    #[test]
    fn execute_finalizes_and_invokes() {
        let source = ModuleSource::bytes("answer.wat", GUEST.as_bytes().to_vec());
        let report = execute(&BridgeConfig::default(), &source, Some("answer")).unwrap();

        assert_eq!(report.module, "answer.wat");
        assert_eq!(report.memory_bytes, 64 * 1024);
        assert_eq!(report.live_handles, 0);
        assert_eq!(report.results, Some(vec!["42".to_string()]));
        assert!(report.exception.is_none());
    }

    #[test]
    fn unknown_export_fails() {
        let source = ModuleSource::bytes("answer.wat", GUEST.as_bytes().to_vec());
        assert!(execute(&BridgeConfig::default(), &source, Some("missing")).is_err());
    }

    #[test]
    fn format_val_decodes_floats() {
        assert_eq!(format_val(&Val::F64(1.5f64.to_bits())), "1.5");
        assert_eq!(format_val(&Val::I32(-3)), "-3");
    }
}
