//! Field descriptor overlay
//!
//! Fixed 16-byte packed record. Offset, type code, attribute bits and
//! protection are pure offset reads; the member token (when the packed
//! index has overflowed into the full-token encoding) and the load size
//! of non-fixed-width fields are delegated to engine routines.

use strum::FromRepr;

use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::layout::field_desc as layout;
use crate::overlay::ElementType;

/// Field protection level (3-bit field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, strum::Display)]
#[repr(u8)]
pub enum ProtectionLevel {
    PrivateScope = 0,
    Private = 1,
    FamilyAndAssembly = 2,
    Assembly = 3,
    Family = 4,
    FamilyOrAssembly = 5,
    Public = 6,
}

/// Engine routines the overlay cannot replace with offset math.
///
/// `load_size` runs the engine's own field-sizing algorithm; `member_token`
/// recovers the metadata token when the packed index encoding has
/// overflowed. Both take the descriptor's address.
pub trait FieldDescRoutines {
    fn load_size(&self, field_desc: u64) -> Result<u32>;
    fn member_token(&self, field_desc: u64) -> Result<u32>;
}

pub struct FieldDescView<'r, R> {
    memory: R,
    address: u64,
    routines: Option<&'r dyn FieldDescRoutines>,
}

impl<'r, R: ReadMemory> FieldDescView<'r, R> {
    pub fn new(memory: R, address: u64) -> Self {
        Self {
            memory,
            address,
            routines: None,
        }
    }

    pub fn with_routines(mut self, routines: &'r dyn FieldDescRoutines) -> Self {
        self.routines = Some(routines);
        self
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    fn dword1(&self) -> Result<u32> {
        self.memory.read_u32(self.address + layout::DWORD1)
    }

    fn dword2(&self) -> Result<u32> {
        self.memory.read_u32(self.address + layout::DWORD2)
    }

    pub fn enclosing_type(&self) -> Result<u64> {
        self.memory.read_u64(self.address + layout::ENCLOSING_TYPE)
    }

    /// Field offset within the enclosing instance (27-bit field).
    pub fn offset(&self) -> Result<u32> {
        Ok(self.dword2()? & layout::OFFSET_MASK)
    }

    /// Raw 5-bit element type code.
    pub fn element_type_code(&self) -> Result<u8> {
        Ok(((self.dword2()? >> layout::ELEMENT_TYPE_SHIFT) & layout::ELEMENT_TYPE_MASK) as u8)
    }

    pub fn element_type(&self) -> Result<ElementType> {
        let code = self.element_type_code()?;
        ElementType::from_repr(code)
            .ok_or_else(|| Error::UnsupportedLayout(format!("element type code {code:#x}")))
    }

    pub fn is_static(&self) -> Result<bool> {
        Ok(self.dword1()? & (1 << layout::IS_STATIC_BIT) != 0)
    }

    pub fn is_thread_local(&self) -> Result<bool> {
        Ok(self.dword1()? & (1 << layout::IS_THREAD_LOCAL_BIT) != 0)
    }

    pub fn is_rva(&self) -> Result<bool> {
        Ok(self.dword1()? & (1 << layout::IS_RVA_BIT) != 0)
    }

    pub fn requires_full_token(&self) -> Result<bool> {
        Ok(self.dword1()? & (1 << layout::REQUIRES_FULL_TOKEN_BIT) != 0)
    }

    pub fn protection(&self) -> Result<ProtectionLevel> {
        let code = ((self.dword1()? >> layout::PROTECTION_SHIFT) & layout::PROTECTION_MASK) as u8;
        ProtectionLevel::from_repr(code)
            .ok_or_else(|| Error::UnsupportedLayout(format!("protection level {code}")))
    }

    /// Full metadata token. Pure read in the packed encoding; delegated
    /// when the requires-full-token bit is set (the packed bits then hold
    /// a name hash, not an index).
    pub fn token(&self) -> Result<u32> {
        if self.requires_full_token()? {
            return self.routines()?.member_token(self.address);
        }
        Ok(layout::FIELD_TOKEN_TYPE | (self.dword1()? & layout::PACKED_INDEX_MASK))
    }

    /// Field size in bytes. Pure for fixed-width element types; delegated
    /// for value types and anything else the code alone cannot size.
    pub fn size(&self) -> Result<u32> {
        if let Some(size) = self.element_type()?.fixed_size() {
            return Ok(size as u32);
        }
        self.routines()?.load_size(self.address)
    }

    fn routines(&self) -> Result<&'r dyn FieldDescRoutines> {
        self.routines
            .ok_or_else(|| Error::RoutineNotBound("field descriptor routines".to_string()))
    }
}
