//! Debug-help symbol store
//!
//! Wraps a DbgHelp session for one module's PDB. Sessions are opened
//! against the current process pseudo-handle and must be closed to
//! release the engine; the store logs a warning if dropped while open.

use std::mem::size_of;
use std::path::Path;

use tracing::{debug, warn};
use windows::Win32::Foundation::HANDLE;
use windows::Win32::System::Diagnostics::Debug::{
    SymCleanup, SymFromNameW, SymInitializeW, SymLoadModuleExW, SymUnloadModule64, SYMBOL_INFOW,
    SYM_LOAD_FLAGS,
};
use windows::Win32::System::Threading::GetCurrentProcess;
use windows::core::PCWSTR;

use crate::error::{Error, Result};
use crate::symbols::SymbolStore;

const MAX_SYMBOL_NAME: usize = 1024;

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

pub struct DbgHelpStore {
    process: HANDLE,
    module: String,
    load_base: u64,
    open: bool,
}

impl DbgHelpStore {
    /// Open a session for `module` using the symbol data at `pdb_path`.
    pub fn open<P: AsRef<Path>>(module: &str, pdb_path: P) -> Result<Self> {
        let process = unsafe { GetCurrentProcess() };
        let path = pdb_path.as_ref().display().to_string();

        unsafe { SymInitializeW(process, PCWSTR::null(), false) }.map_err(|e| {
            Error::SymbolStoreUnavailable {
                module: module.to_string(),
                message: format!("SymInitialize: {}", e.message()),
            }
        })?;

        let image = wide(&path);
        let load_base = unsafe {
            SymLoadModuleExW(
                process,
                HANDLE::default(),
                PCWSTR(image.as_ptr()),
                PCWSTR::null(),
                0,
                0,
                None,
                SYM_LOAD_FLAGS(0),
            )
        };
        if load_base == 0 {
            unsafe { SymCleanup(process) }.ok();
            return Err(Error::SymbolStoreUnavailable {
                module: module.to_string(),
                message: format!("SymLoadModuleEx failed for {path}"),
            });
        }

        debug!("Symbol store for {} open at {:#x}", module, load_base);
        Ok(Self {
            process,
            module: module.to_string(),
            load_base,
            open: true,
        })
    }
}

impl SymbolStore for DbgHelpStore {
    fn module(&self) -> &str {
        &self.module
    }

    fn resolve(&self, qualified: &str) -> Result<u64> {
        // SYMBOL_INFOW is followed by an inline wide-char name buffer;
        // u64 backing keeps the struct aligned.
        let words =
            (size_of::<SYMBOL_INFOW>() + MAX_SYMBOL_NAME * size_of::<u16>()).div_ceil(8);
        let mut buffer = vec![0u64; words];
        let info = buffer.as_mut_ptr() as *mut SYMBOL_INFOW;
        unsafe {
            (*info).SizeOfStruct = size_of::<SYMBOL_INFOW>() as u32;
            (*info).MaxNameLen = MAX_SYMBOL_NAME as u32;
        }

        let name = wide(qualified);
        unsafe { SymFromNameW(self.process, PCWSTR(name.as_ptr()), info) }
            .map_err(|_| Error::SymbolNotFound(qualified.to_string()))?;

        let address = unsafe { (*info).Address };
        let mod_base = unsafe { (*info).ModBase };
        let base = if mod_base != 0 { mod_base } else { self.load_base };
        Ok(address - base)
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        unsafe {
            SymUnloadModule64(self.process, self.load_base).ok();
            SymCleanup(self.process)
        }
        .map_err(|e| Error::SymbolStoreUnavailable {
            module: self.module.clone(),
            message: format!("SymCleanup: {}", e.message()),
        })
    }
}

impl Drop for DbgHelpStore {
    fn drop(&mut self) {
        if self.open {
            warn!("Symbol store for {} dropped without close", self.module);
            self.close().ok();
        }
    }
}
