//! In-process module provider
//!
//! Enumerates the modules mapped into the current process and snapshots
//! their bytes. Segment selection walks the PE section headers of the
//! loaded image in place.

use std::mem::size_of;

use tracing::debug;
use windows::Win32::Foundation::HMODULE;
use windows::Win32::System::Diagnostics::Debug::{
    IMAGE_FILE_HEADER, IMAGE_NT_HEADERS64, IMAGE_SECTION_HEADER,
};
use windows::Win32::System::ProcessStatus::{
    EnumProcessModules, GetModuleBaseNameW, GetModuleInformation, MODULEINFO,
};
use windows::Win32::System::SystemServices::{
    IMAGE_DOS_HEADER, IMAGE_DOS_SIGNATURE, IMAGE_NT_SIGNATURE,
};
use windows::Win32::System::Threading::GetCurrentProcess;

use crate::error::{Error, Result};
use crate::memory::{ProcessMemory, ReadMemory};
use crate::module::{ModuleInfo, ModuleProvider, SegmentSnapshot};

pub struct LoadedModuleProvider {
    memory: ProcessMemory,
}

impl LoadedModuleProvider {
    pub fn new() -> Self {
        Self {
            memory: ProcessMemory::new(),
        }
    }

    fn read_struct<T: Copy>(&self, address: u64) -> Result<T> {
        let bytes = self.memory.read_bytes(address, size_of::<T>())?;
        // SAFETY: the buffer holds size_of::<T>() bytes and T is a plain
        // PE header struct with no invalid bit patterns.
        Ok(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const T) })
    }

    fn section_headers(&self, base: u64) -> Result<Vec<IMAGE_SECTION_HEADER>> {
        let dos: IMAGE_DOS_HEADER = self.read_struct(base)?;
        if dos.e_magic != IMAGE_DOS_SIGNATURE {
            return Err(Error::UnsupportedLayout(format!(
                "no DOS signature at {base:#x}"
            )));
        }

        let nt_address = base + dos.e_lfanew as u64;
        let nt: IMAGE_NT_HEADERS64 = self.read_struct(nt_address)?;
        if nt.Signature != IMAGE_NT_SIGNATURE {
            return Err(Error::UnsupportedLayout(format!(
                "no PE signature at {nt_address:#x}"
            )));
        }

        let first_section = nt_address
            + 4
            + size_of::<IMAGE_FILE_HEADER>() as u64
            + nt.FileHeader.SizeOfOptionalHeader as u64;

        let mut sections = Vec::with_capacity(nt.FileHeader.NumberOfSections as usize);
        for i in 0..nt.FileHeader.NumberOfSections as u64 {
            let address = first_section + i * size_of::<IMAGE_SECTION_HEADER>() as u64;
            sections.push(self.read_struct::<IMAGE_SECTION_HEADER>(address)?);
        }
        Ok(sections)
    }
}

impl Default for LoadedModuleProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn section_name(section: &IMAGE_SECTION_HEADER) -> String {
    let len = section
        .Name
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(section.Name.len());
    String::from_utf8_lossy(&section.Name[..len]).into_owned()
}

impl ModuleProvider for LoadedModuleProvider {
    fn modules(&self) -> Result<Vec<ModuleInfo>> {
        let process = unsafe { GetCurrentProcess() };
        let mut handles = vec![HMODULE::default(); 1024];
        let mut needed = 0u32;

        unsafe {
            EnumProcessModules(
                process,
                handles.as_mut_ptr(),
                (handles.len() * size_of::<HMODULE>()) as u32,
                &mut needed,
            )
        }
        .map_err(|e| Error::MemoryReadFailed {
            address: 0,
            message: format!("EnumProcessModules: {}", e.message()),
        })?;

        let count = (needed as usize / size_of::<HMODULE>()).min(handles.len());
        let mut modules = Vec::with_capacity(count);

        for &handle in &handles[..count] {
            let mut name_buf = [0u16; 260];
            let len = unsafe { GetModuleBaseNameW(process, handle, &mut name_buf) } as usize;
            if len == 0 {
                continue;
            }
            let name = String::from_utf16_lossy(&name_buf[..len]);

            let mut info = MODULEINFO::default();
            if unsafe {
                GetModuleInformation(process, handle, &mut info, size_of::<MODULEINFO>() as u32)
            }
            .is_err()
            {
                continue;
            }

            modules.push(ModuleInfo {
                name,
                base: info.lpBaseOfDll as u64,
                size: info.SizeOfImage as u64,
            });
        }

        Ok(modules)
    }

    fn snapshot_module(&self, name: &str) -> Result<SegmentSnapshot> {
        let module = self.module(name)?;
        let bytes = self.memory.read_bytes(module.base, module.size as usize)?;
        Ok(SegmentSnapshot {
            base: module.base,
            segment: None,
            bytes,
            module,
        })
    }

    fn snapshot_segment(&self, name: &str, segment: &str) -> Result<SegmentSnapshot> {
        let module = self.module(name)?;

        for section in self.section_headers(module.base)? {
            if section_name(&section) != segment {
                continue;
            }

            let base = module.base + section.VirtualAddress as u64;
            let size = unsafe { section.Misc.VirtualSize } as usize;
            debug!(
                "Segment {} of {}: {:#x}, {} bytes",
                segment, module.name, base, size
            );
            let bytes = self.memory.read_bytes(base, size)?;
            return Ok(SegmentSnapshot {
                base,
                segment: Some(segment.to_string()),
                bytes,
                module,
            });
        }

        Err(Error::SegmentNotFound {
            module: name.to_string(),
            segment: segment.to_string(),
        })
    }
}
