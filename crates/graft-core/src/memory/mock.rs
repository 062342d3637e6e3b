//! In-memory test double for [`ReadMemory`]
//!
//! Builds a sparse address space out of byte regions so overlay and
//! scanner tests can run against synthetic records without a live
//! process.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::memory::ReadMemory;

#[derive(Debug, Default)]
pub struct MockMemory {
    regions: BTreeMap<u64, Vec<u8>>,
}

impl MockMemory {
    pub fn builder() -> MockMemoryBuilder {
        MockMemoryBuilder::default()
    }
}

impl ReadMemory for MockMemory {
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let fail = || Error::MemoryReadFailed {
            address,
            message: "address not mapped".to_string(),
        };

        let (base, bytes) = self
            .regions
            .range(..=address)
            .next_back()
            .ok_or_else(fail)?;
        let start = (address - base) as usize;
        let end = start.checked_add(len).ok_or_else(fail)?;
        if end > bytes.len() {
            return Err(fail());
        }
        Ok(bytes[start..end].to_vec())
    }
}

#[derive(Debug, Default)]
pub struct MockMemoryBuilder {
    regions: BTreeMap<u64, Vec<u8>>,
}

impl MockMemoryBuilder {
    pub fn region(mut self, base: u64, bytes: &[u8]) -> Self {
        self.regions.insert(base, bytes.to_vec());
        self
    }

    pub fn u16_at(self, address: u64, value: u16) -> Self {
        self.region(address, &value.to_le_bytes())
    }

    pub fn u32_at(self, address: u64, value: u32) -> Self {
        self.region(address, &value.to_le_bytes())
    }

    pub fn u64_at(self, address: u64, value: u64) -> Self {
        self.region(address, &value.to_le_bytes())
    }

    pub fn build(self) -> MockMemory {
        MockMemory {
            regions: self.regions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_within_region() {
        let memory = MockMemory::builder()
            .region(0x1000, &[1, 2, 3, 4])
            .build();
        assert_eq!(memory.read_bytes(0x1001, 2).unwrap(), vec![2, 3]);
        assert_eq!(memory.read_u16(0x1000).unwrap(), 0x0201);
    }

    #[test]
    fn test_read_outside_region_fails() {
        let memory = MockMemory::builder()
            .region(0x1000, &[1, 2, 3, 4])
            .build();
        assert!(memory.read_bytes(0x1003, 2).is_err());
        assert!(memory.read_bytes(0x0FFF, 1).is_err());
    }
}
