//! Version command - show version information.

use anyhow::Result;

/// Version information.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the version command.
pub fn run() -> Result<()> {
    println!("Tether - Foreign Memory Bridge");
    println!();
    println!("Version:     {}", VERSION);
    println!("Engine:      wasmtime");
    println!(
        "Platform:    {} / {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    println!();
    println!("Components:");
    println!("  tether-core     Slot table, view cache, string codec, closure adapters");
    println!("  tether-runtime  Module loading, intrinsics, instance lifecycle");
    println!("  tether-cli      Command-line interface");

    Ok(())
}
