//! Entry-point patching
//!
//! The destructive mutation path: unprotect the page holding a method's
//! entry-point slot, write the new address through the engine's own
//! setter, reprotect. Restoring the original protection is mandatory
//! cleanup, attempted even when the write fails. Every successful patch
//! returns a [`PatchRecord`] carrying the original entry point so it can
//! be reverted.

#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "windows")]
pub use windows::VirtualProtection;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::memory::layout::method_desc;

/// Page protection states the patcher cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageProtection {
    NoAccess,
    ReadOnly,
    ReadWrite,
    Execute,
    ExecuteRead,
    ExecuteReadWrite,
}

/// OS-level page protection provider.
///
/// `change_protection` is atomic at the OS call granularity and returns
/// the previous protection so callers can restore it.
pub trait ProtectMemory {
    fn change_protection(
        &self,
        address: u64,
        len: usize,
        protection: PageProtection,
    ) -> Result<PageProtection>;
}

/// Engine routines for reading and writing a method's stable entry
/// point. The exact slot offset and update algorithm are engine-version
/// dependent, so both go through bound engine calls.
pub trait EntryPointRoutines {
    fn stable_entry_point(&self, method_desc: u64) -> Result<u64>;
    fn set_stable_entry_point(&self, method_desc: u64, entry_point: u64) -> Result<()>;
}

/// Method attribute flags relevant to patch legality (metadata format).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodAttributes(pub u16);

impl MethodAttributes {
    pub const VIRTUAL: u16 = 0x0040;
    pub const ABSTRACT: u16 = 0x0400;

    pub fn is_virtual(self) -> bool {
        self.0 & Self::VIRTUAL != 0
    }

    pub fn is_abstract(self) -> bool {
        self.0 & Self::ABSTRACT != 0
    }
}

/// A method selected for entry-point redirection: its backing descriptor
/// plus the attributes needed for the legality check.
#[derive(Debug, Clone, Copy)]
pub struct PatchTarget {
    pub method_desc: u64,
    pub attributes: MethodAttributes,
}

/// Proof of a completed patch, holding what is needed to undo it.
#[derive(Debug, Clone, Copy)]
pub struct PatchRecord {
    pub method_desc: u64,
    pub original_entry_point: u64,
    pub new_entry_point: u64,
}

pub struct EntryPointPatcher<'a> {
    protection: &'a dyn ProtectMemory,
    routines: &'a dyn EntryPointRoutines,
}

impl<'a> EntryPointPatcher<'a> {
    pub fn new(protection: &'a dyn ProtectMemory, routines: &'a dyn EntryPointRoutines) -> Self {
        Self {
            protection,
            routines,
        }
    }

    /// Redirect `target` so its callers jump to `new_address`.
    ///
    /// Virtual and abstract methods are rejected before any memory is
    /// touched: their dispatch goes through a table slot, not a stable
    /// code pointer, and a direct patch would not take effect.
    pub fn set_entry_point(&self, target: &PatchTarget, new_address: u64) -> Result<PatchRecord> {
        if target.attributes.is_virtual() || target.attributes.is_abstract() {
            return Err(Error::IllegalPatchTarget(format!(
                "method descriptor {:#x} is virtual or abstract",
                target.method_desc
            )));
        }

        let original = self.routines.stable_entry_point(target.method_desc)?;
        self.write_entry_point(target.method_desc, new_address)?;

        debug!(
            "Entry point of {:#x} moved: {:#x} -> {:#x}",
            target.method_desc, original, new_address
        );
        Ok(PatchRecord {
            method_desc: target.method_desc,
            original_entry_point: original,
            new_entry_point: new_address,
        })
    }

    /// Exchange the entry points of two methods.
    ///
    /// Both targets go through the same legality checks and protection
    /// sequencing as [`set_entry_point`](Self::set_entry_point). When
    /// the second redirect fails the first is reverted, so the pair is
    /// swapped or untouched.
    pub fn swap(&self, a: &PatchTarget, b: &PatchTarget) -> Result<(PatchRecord, PatchRecord)> {
        let b_entry = self.routines.stable_entry_point(b.method_desc)?;

        let first = self.set_entry_point(a, b_entry)?;
        match self.set_entry_point(b, first.original_entry_point) {
            Ok(second) => Ok((first, second)),
            Err(e) => {
                if let Err(revert_err) = self.revert(&first) {
                    warn!(
                        "Swap rollback of {:#x} failed: {}",
                        first.method_desc, revert_err
                    );
                }
                Err(e)
            }
        }
    }

    /// Undo a previous patch by restoring the captured entry point.
    pub fn revert(&self, record: &PatchRecord) -> Result<()> {
        self.write_entry_point(record.method_desc, record.original_entry_point)?;
        debug!(
            "Entry point of {:#x} restored to {:#x}",
            record.method_desc, record.original_entry_point
        );
        Ok(())
    }

    fn write_entry_point(&self, method_desc: u64, entry_point: u64) -> Result<()> {
        let len = method_desc::RECORD_SIZE as usize;
        let previous = self.protection.change_protection(
            method_desc,
            len,
            PageProtection::ExecuteReadWrite,
        )?;

        let written = self.routines.set_stable_entry_point(method_desc, entry_point);

        // Mandatory cleanup: attempted even when the write failed.
        let restored = self.protection.change_protection(method_desc, len, previous);

        match (written, restored) {
            (Ok(()), Ok(_)) => Ok(()),
            (Err(write_err), Ok(_)) => Err(write_err),
            (Ok(()), Err(restore_err)) => Err(restore_err),
            (Err(write_err), Err(restore_err)) => {
                warn!(
                    "Protection restore failed after failed write at {:#x}: {}",
                    method_desc, restore_err
                );
                Err(write_err)
            }
        }
    }
}
