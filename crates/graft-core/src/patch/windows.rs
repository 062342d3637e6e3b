//! VirtualProtect-backed protection provider

use std::ffi::c_void;

use windows::Win32::System::Memory::{
    PAGE_EXECUTE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_NOACCESS,
    PAGE_PROTECTION_FLAGS, PAGE_READONLY, PAGE_READWRITE, VirtualProtect,
};

use crate::error::{Error, Result};
use crate::patch::{PageProtection, ProtectMemory};

fn to_native(protection: PageProtection) -> PAGE_PROTECTION_FLAGS {
    match protection {
        PageProtection::NoAccess => PAGE_NOACCESS,
        PageProtection::ReadOnly => PAGE_READONLY,
        PageProtection::ReadWrite => PAGE_READWRITE,
        PageProtection::Execute => PAGE_EXECUTE,
        PageProtection::ExecuteRead => PAGE_EXECUTE_READ,
        PageProtection::ExecuteReadWrite => PAGE_EXECUTE_READWRITE,
    }
}

fn from_native(address: u64, flags: PAGE_PROTECTION_FLAGS) -> Result<PageProtection> {
    match flags {
        PAGE_NOACCESS => Ok(PageProtection::NoAccess),
        PAGE_READONLY => Ok(PageProtection::ReadOnly),
        PAGE_READWRITE => Ok(PageProtection::ReadWrite),
        PAGE_EXECUTE => Ok(PageProtection::Execute),
        PAGE_EXECUTE_READ => Ok(PageProtection::ExecuteRead),
        PAGE_EXECUTE_READWRITE => Ok(PageProtection::ExecuteReadWrite),
        other => Err(Error::ProtectionChangeFailed {
            address,
            message: format!("unmapped protection flags {:#x}", other.0),
        }),
    }
}

/// In-process protection provider over `VirtualProtect`.
#[derive(Debug, Default)]
pub struct VirtualProtection;

impl VirtualProtection {
    pub fn new() -> Self {
        Self
    }
}

impl ProtectMemory for VirtualProtection {
    fn change_protection(
        &self,
        address: u64,
        len: usize,
        protection: PageProtection,
    ) -> Result<PageProtection> {
        let mut previous = PAGE_PROTECTION_FLAGS(0);
        unsafe {
            VirtualProtect(
                address as *const c_void,
                len,
                to_native(protection),
                &mut previous,
            )
        }
        .map_err(|e| Error::ProtectionChangeFailed {
            address,
            message: e.message(),
        })?;
        from_native(address, previous)
    }
}
