use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::symbols::SymbolStore;

/// One resolved symbol in a symbol-file document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub name: String,
    pub rva: u64,
}

/// Portable symbol cache for one module: qualified names mapped to
/// module-relative offsets, stored as JSON.
///
/// Serves as the alternate back end when no debug-help store is
/// available, and as a cache in front of one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolFile {
    pub module: String,
    #[serde(default)]
    pub version: String,
    pub symbols: Vec<SymbolEntry>,
}

impl SymbolFile {
    pub fn new(module: &str, version: &str) -> Self {
        Self {
            module: module.to_string(),
            version: version.to_string(),
            symbols: Vec::new(),
        }
    }

    pub fn insert(&mut self, name: &str, rva: u64) {
        match self.symbols.iter_mut().find(|s| s.name == name) {
            Some(entry) => entry.rva = rva,
            None => self.symbols.push(SymbolEntry {
                name: name.to_string(),
                rva,
            }),
        }
    }
}

impl SymbolStore for SymbolFile {
    fn module(&self) -> &str {
        &self.module
    }

    fn resolve(&self, qualified: &str) -> Result<u64> {
        self.symbols
            .iter()
            .find(|s| s.name == qualified)
            .map(|s| s.rva)
            .ok_or_else(|| Error::SymbolNotFound(qualified.to_string()))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub fn load_symbol_file<P: AsRef<Path>>(path: P) -> Result<SymbolFile> {
    let content = fs::read_to_string(&path).map_err(|e| Error::SymbolStoreUnavailable {
        module: path.as_ref().display().to_string(),
        message: e.to_string(),
    })?;
    let file: SymbolFile = serde_json::from_str(&content)?;
    debug!(
        "Loaded {} symbols for {} from {}",
        file.symbols.len(),
        file.module,
        path.as_ref().display()
    );
    Ok(file)
}

pub fn save_symbol_file<P: AsRef<Path>>(path: P, file: &SymbolFile) -> Result<()> {
    let content = serde_json::to_string_pretty(file)?;
    fs::write(path, content)?;
    Ok(())
}
