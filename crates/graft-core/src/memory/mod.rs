pub mod layout;

#[cfg(target_os = "windows")]
mod process;

#[cfg(test)]
pub mod mock;

#[cfg(target_os = "windows")]
pub use process::ProcessMemory;

#[cfg(test)]
pub use mock::{MockMemory, MockMemoryBuilder};

use crate::error::Result;

/// Absolute-address reads over externally-owned memory.
///
/// Implementations return a faithful snapshot of the bytes at the time of
/// the call; no guarantee is made against concurrent self-modification of
/// the target.
pub trait ReadMemory {
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>>;

    fn read_u8(&self, address: u64) -> Result<u8> {
        let bytes = self.read_bytes(address, 1)?;
        Ok(bytes[0])
    }

    fn read_u16(&self, address: u64) -> Result<u16> {
        let bytes = self.read_bytes(address, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&self, address: u64) -> Result<u32> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32(&self, address: u64) -> Result<i32> {
        Ok(self.read_u32(address)? as i32)
    }

    fn read_u64(&self, address: u64) -> Result<u64> {
        let bytes = self.read_bytes(address, 8)?;
        Ok(u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }
}

impl<T: ReadMemory + ?Sized> ReadMemory for &T {
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        (**self).read_bytes(address, len)
    }
}
