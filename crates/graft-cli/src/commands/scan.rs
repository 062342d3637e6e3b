//! Scan command implementation.

use anyhow::Result;

/// Run the scan command
#[cfg(target_os = "windows")]
pub fn run(
    module: &str,
    pattern: &str,
    segment: &str,
    whole_module: bool,
    offset_guess: i64,
    all: bool,
) -> Result<()> {
    use graft_core::{
        LoadedModuleProvider, ModuleProvider, ModuleScanner, Signature, pattern::find_all,
    };
    use owo_colors::OwoColorize;
    use tracing::info;

    let signature = Signature::parse(pattern)?;
    info!("Scanning {} for {} ({} bytes)", module, pattern, signature.len());
    let provider = LoadedModuleProvider::new();
    let mut scanner = ModuleScanner::new(&provider);

    if whole_module {
        scanner.select_module(module)?;
    } else {
        scanner.select_module_segment(module, segment)?;
    }

    if all {
        let snapshot = if whole_module {
            provider.snapshot_module(module)?
        } else {
            provider.snapshot_segment(module, segment)?
        };
        let matches = find_all(&snapshot.bytes, &signature);
        if matches.is_empty() {
            println!("{}", "No matches".red());
            return Ok(());
        }
        println!("{} match(es):", matches.len());
        for pos in matches {
            println!("  {:#x}", (snapshot.base + pos as u64).green());
        }
        return Ok(());
    }

    let resolved = scanner.find_pattern_with_guess(&signature, offset_guess)?;
    println!(
        "{} in {} -> {}",
        pattern,
        resolved.module,
        format!("{:#x}", resolved.address).green()
    );
    Ok(())
}

#[cfg(not(target_os = "windows"))]
pub fn run(
    _module: &str,
    _pattern: &str,
    _segment: &str,
    _whole_module: bool,
    _offset_guess: i64,
    _all: bool,
) -> Result<()> {
    anyhow::bail!("scanning loaded modules is only supported on Windows")
}
