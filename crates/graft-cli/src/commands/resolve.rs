//! Resolve command implementation.

use std::path::Path;

use anyhow::Result;
use graft_core::{SymbolStore, load_symbol_file};
use tracing::info;

/// Run the resolve command
pub fn run(module: &str, name: &str, symbols: &Path, rva_only: bool) -> Result<()> {
    let file = load_symbol_file(symbols)?;
    info!(
        "Loaded {} symbols for {} from {}",
        file.symbols.len(),
        file.module,
        symbols.display()
    );
    if !file.module.eq_ignore_ascii_case(module) {
        anyhow::bail!(
            "symbol file is for {}, not {}",
            file.module,
            module
        );
    }

    let rva = file.resolve(name)?;
    println!("{} + {:#x}", module, rva);

    if rva_only {
        return Ok(());
    }

    absolute(module, rva)
}

#[cfg(target_os = "windows")]
fn absolute(module: &str, rva: u64) -> Result<()> {
    use graft_core::{LoadedModuleProvider, ModuleProvider};

    let info = LoadedModuleProvider::new().module(module)?;
    println!("Absolute: {:#x}", info.base + rva);
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn absolute(_module: &str, _rva: u64) -> Result<()> {
    anyhow::bail!("absolute resolution needs the module loaded; use --rva-only on this platform")
}
