//! Signatures command implementation.

use std::path::Path;

use anyhow::Result;
use graft_core::load_signatures;
use owo_colors::OwoColorize;

/// Run the signatures command
pub fn run(file: &Path) -> Result<()> {
    let set = load_signatures(file)?;
    println!("Signature set for engine version {}", set.version);

    let mut invalid = 0usize;
    for entry in &set.entries {
        match entry.signature() {
            Ok(signature) => {
                println!(
                    "  {} {} ({} bytes, guess {:+})",
                    "ok".green(),
                    entry.name,
                    signature.len(),
                    entry.offset_guess
                );
            }
            Err(e) => {
                invalid += 1;
                println!("  {} {}: {}", "bad".red(), entry.name, e);
            }
        }
    }

    if invalid > 0 {
        anyhow::bail!("{} invalid signature(s)", invalid);
    }
    println!("{} entries, all valid", set.entries.len());
    Ok(())
}
