//! In-process memory reader
//!
//! Reads the current process's own address space. Goes through
//! `ReadProcessMemory` rather than raw dereference so that an unmapped
//! address surfaces as an error instead of an access violation.

use std::ffi::c_void;

use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
use windows::Win32::System::Threading::GetCurrentProcess;

use crate::error::{Error, Result};
use crate::memory::ReadMemory;

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessMemory;

impl ProcessMemory {
    pub fn new() -> Self {
        Self
    }
}

impl ReadMemory for ProcessMemory {
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        let mut read = 0usize;

        // SAFETY: the buffer outlives the call and the pseudo handle from
        // GetCurrentProcess needs no closing.
        let result = unsafe {
            ReadProcessMemory(
                GetCurrentProcess(),
                address as *const c_void,
                buffer.as_mut_ptr() as *mut c_void,
                len,
                Some(&mut read),
            )
        };

        if let Err(e) = result {
            return Err(Error::MemoryReadFailed {
                address,
                message: e.message(),
            });
        }
        if read != len {
            return Err(Error::MemoryReadFailed {
                address,
                message: format!("partial read: {read} of {len} bytes"),
            });
        }

        Ok(buffer)
    }
}
