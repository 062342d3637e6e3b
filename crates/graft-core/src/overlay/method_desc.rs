//! Method descriptor overlay
//!
//! Variable-classification record. Flags, slot number and chunk index are
//! pure offset reads. The record's true size, its native code address,
//! its metadata token and its enclosing method table are engine-version
//! dependent and delegated to engine routines; only the raw function
//! pointer slot is readable directly, and only for the classifications
//! that actually store one there.

use strum::FromRepr;

use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::layout::method_desc as layout;

/// Method implementation classification (3-bit field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, strum::Display)]
#[repr(u8)]
pub enum MethodClassification {
    Il = 0,
    FCall = 1,
    PInvoke = 2,
    EeImpl = 3,
    Array = 4,
    Instantiated = 5,
    ComInterop = 6,
    Dynamic = 7,
}

/// Engine routines backing the accessors the overlay cannot compute.
pub trait MethodDescRoutines {
    /// True size of the record, optional slots included.
    fn record_size(&self, method_desc: u64) -> Result<u32>;
    /// Address of the method's native code, or 0 when not yet compiled.
    fn native_code(&self, method_desc: u64) -> Result<u64>;
    /// Full metadata token.
    fn member_token(&self, method_desc: u64) -> Result<u32>;
    /// Enclosing method table, recovered through the chunk header.
    fn enclosing_table(&self, method_desc: u64) -> Result<u64>;
}

pub struct MethodDescView<'r, R> {
    memory: R,
    address: u64,
    routines: Option<&'r dyn MethodDescRoutines>,
}

impl<'r, R: ReadMemory> MethodDescView<'r, R> {
    pub fn new(memory: R, address: u64) -> Self {
        Self {
            memory,
            address,
            routines: None,
        }
    }

    pub fn with_routines(mut self, routines: &'r dyn MethodDescRoutines) -> Self {
        self.routines = Some(routines);
        self
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn token_remainder(&self) -> Result<u16> {
        self.memory
            .read_u16(self.address + layout::FLAGS3_AND_TOKEN_REMAINDER)
    }

    pub fn chunk_index(&self) -> Result<u8> {
        self.memory.read_u8(self.address + layout::CHUNK_INDEX)
    }

    pub fn flags2(&self) -> Result<u8> {
        self.memory.read_u8(self.address + layout::FLAGS2)
    }

    pub fn slot_number(&self) -> Result<u16> {
        self.memory.read_u16(self.address + layout::SLOT_NUMBER)
    }

    pub fn flags(&self) -> Result<u16> {
        self.memory.read_u16(self.address + layout::FLAGS)
    }

    pub fn classification(&self) -> Result<MethodClassification> {
        let code = (self.flags()? & layout::CLASSIFICATION_MASK) as u8;
        MethodClassification::from_repr(code)
            .ok_or_else(|| Error::UnsupportedLayout(format!("method classification {code}")))
    }

    pub fn is_static(&self) -> Result<bool> {
        Ok(self.flags()? & layout::FLAG_STATIC != 0)
    }

    pub fn has_non_vtable_slot(&self) -> Result<bool> {
        Ok(self.flags()? & layout::FLAG_HAS_NON_VTABLE_SLOT != 0)
    }

    pub fn has_stable_entry_point(&self) -> Result<bool> {
        Ok(self.flags2()? & layout::FLAG2_HAS_STABLE_ENTRY_POINT != 0)
    }

    pub fn has_precode(&self) -> Result<bool> {
        Ok(self.flags2()? & layout::FLAG2_HAS_PRECODE != 0)
    }

    pub fn is_unboxing_stub(&self) -> Result<bool> {
        Ok(self.flags2()? & layout::FLAG2_IS_UNBOXING_STUB != 0)
    }

    /// Raw function pointer slot. Meaningful only for non-virtual,
    /// non-abstract, non-generic methods; everything else must use
    /// [`native_code`](Self::native_code).
    pub fn function_pointer(&self) -> Result<u64> {
        self.memory.read_u64(self.address + layout::FUNCTION_POINTER)
    }

    /// Delegated: true record size.
    pub fn record_size(&self) -> Result<u32> {
        self.routines()?.record_size(self.address)
    }

    /// Delegated: native code address.
    pub fn native_code(&self) -> Result<u64> {
        self.routines()?.native_code(self.address)
    }

    /// Delegated: full metadata token.
    pub fn token(&self) -> Result<u32> {
        self.routines()?.member_token(self.address)
    }

    /// Delegated: enclosing method table.
    pub fn enclosing_table(&self) -> Result<u64> {
        self.routines()?.enclosing_table(self.address)
    }

    fn routines(&self) -> Result<&'r dyn MethodDescRoutines> {
        self.routines
            .ok_or_else(|| Error::RoutineNotBound("method descriptor routines".to_string()))
    }
}
