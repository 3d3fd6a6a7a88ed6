//! Validate command - check a bridge configuration file.

use anyhow::Result;
use std::path::Path;
use tether_runtime::{BridgeConfig, CLOSURE_WRAPPER_PREFIX};

/// Run the validate command.
pub fn run(file: &str) -> Result<()> {
    let path = Path::new(file);
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", file);
    }

    tracing::info!(file = %file, "Validating bridge config");

    println!("Validation Results for: {}", file);
    println!("========================{}", "=".repeat(file.len()));
    println!();

    let config = match BridgeConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            println!("✗ {}", e);
            anyhow::bail!("Configuration is invalid");
        }
    };
    println!("✓ Configuration parsed");

    let warnings = warnings(&config);
    for warning in &warnings {
        println!("⚠ {}", warning);
    }

    println!();
    println!("Runtime:");
    println!("  Namespace:     {}", config.runtime.import_namespace);
    println!("  Memory limit:  {} pages", config.runtime.max_memory_pages);
    println!(
        "  Fuel:          {}",
        if config.runtime.fuel_enabled {
            config.runtime.fuel_amount.to_string()
        } else {
            "off".to_string()
        }
    );
    println!("  Adapters:      {}", config.adapters.len());

    Ok(())
}

/// Non-fatal issues worth pointing out.
pub fn warnings(config: &BridgeConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    for spec in config.adapters.iter() {
        if !spec.import.starts_with(CLOSURE_WRAPPER_PREFIX) {
            warnings.push(format!(
                "adapter '{}' does not look like a closure wrapper import",
                spec.import
            ));
        }
        if spec.trampoline.is_empty() {
            warnings.push(format!("adapter '{}' has no trampoline", spec.import));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn valid_file_passes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "adapters:\n  - import: __wbindgen_closure_wrapper3\n    trampoline: invoke\n    destructor: 1"
        )
        .unwrap();

        assert!(run(file.path().to_str().unwrap()).is_ok());
    }

    #[test]
    fn broken_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "runtime:\n  max_memory_pages: 0").unwrap();
        assert!(run(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn odd_adapters_warn() {
        let config = BridgeConfig::from_yaml_str(
            "adapters:\n  - import: on_click\n    trampoline: ''\n    destructor: 2",
        )
        .unwrap();
        assert_eq!(warnings(&config).len(), 2);
    }
}
