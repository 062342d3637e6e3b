//! Method table overlay
//!
//! Per-type runtime descriptor. All accessors here are pure offset
//! reads; the only decoding subtlety is the tagged class-info union,
//! which must go through [`decode_class_info`] before any dereference.

use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::layout::method_table as layout;

/// Decoded class-info union slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassInfoSlot {
    /// Points at the extended-class-info block; this table is canonical.
    ExtendedInfo(u64),
    /// Points at the canonical method table, tag bits removed.
    Canonical(u64),
    /// Tag bits match neither known layout.
    Unrecognized { stored: u64, tag: u64 },
}

/// Single decode point for the class-info union. Call sites never mask
/// the tag bits themselves.
pub fn decode_class_info(stored: u64) -> ClassInfoSlot {
    match stored & layout::UNION_TAG_MASK {
        layout::UNION_TAG_EXTENDED_INFO => ClassInfoSlot::ExtendedInfo(stored),
        layout::UNION_TAG_CANONICAL => {
            ClassInfoSlot::Canonical(stored - layout::CANONICAL_TAG_ADJUST)
        }
        tag => ClassInfoSlot::Unrecognized { stored, tag },
    }
}

pub struct MethodTableView<R> {
    memory: R,
    address: u64,
}

impl<R: ReadMemory> MethodTableView<R> {
    pub fn new(memory: R, address: u64) -> Self {
        Self { memory, address }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn flags(&self) -> Result<u32> {
        self.memory.read_u32(self.address + layout::FLAGS)
    }

    pub fn flags2(&self) -> Result<u16> {
        self.memory.read_u16(self.address + layout::FLAGS2)
    }

    pub fn base_size(&self) -> Result<u32> {
        self.memory.read_u32(self.address + layout::BASE_SIZE)
    }

    /// Element size for arrays and strings; `None` when the flags say the
    /// low word of the flags dword is not a component size.
    pub fn component_size(&self) -> Result<Option<u16>> {
        if self.flags()? & layout::FLAG_HAS_COMPONENT_SIZE == 0 {
            return Ok(None);
        }
        Ok(Some(
            self.memory.read_u16(self.address + layout::COMPONENT_SIZE)?,
        ))
    }

    pub fn token(&self) -> Result<u16> {
        self.memory.read_u16(self.address + layout::TOKEN)
    }

    pub fn num_virtuals(&self) -> Result<u16> {
        self.memory.read_u16(self.address + layout::NUM_VIRTUALS)
    }

    pub fn num_interfaces(&self) -> Result<u16> {
        self.memory.read_u16(self.address + layout::NUM_INTERFACES)
    }

    pub fn parent(&self) -> Result<u64> {
        self.memory.read_u64(self.address + layout::PARENT)
    }

    pub fn loader_module(&self) -> Result<u64> {
        self.memory.read_u64(self.address + layout::LOADER_MODULE)
    }

    pub fn is_array(&self) -> Result<bool> {
        Ok(self.flags()? & layout::FLAG_ARRAY != 0)
    }

    pub fn contains_pointers(&self) -> Result<bool> {
        Ok(self.flags()? & layout::FLAG_CONTAINS_POINTERS != 0)
    }

    pub fn has_indirect_parent(&self) -> Result<bool> {
        Ok(self.flags()? & layout::FLAG_HAS_INDIRECT_PARENT != 0)
    }

    /// Decoded class-info union. An unrecognized tag is fatal to this
    /// accessor only, not to the view.
    pub fn class_info(&self) -> Result<ClassInfoSlot> {
        let stored = self.memory.read_u64(self.address + layout::CLASS_INFO_UNION)?;
        match decode_class_info(stored) {
            ClassInfoSlot::Unrecognized { stored, tag } => Err(Error::UnsupportedLayout(format!(
                "class-info union tag {tag:#x} in {stored:#x}"
            ))),
            slot => Ok(slot),
        }
    }

    /// Address of the canonical method table; this table's own address
    /// when the union points at extended info.
    pub fn canonical_table(&self) -> Result<u64> {
        match self.class_info()? {
            ClassInfoSlot::ExtendedInfo(_) => Ok(self.address),
            ClassInfoSlot::Canonical(table) => Ok(table),
            ClassInfoSlot::Unrecognized { .. } => unreachable!(),
        }
    }

    /// Address of the extended-class-info block, chased through the
    /// canonical table when this one is not canonical.
    pub fn extended_info(&self) -> Result<u64> {
        match self.class_info()? {
            ClassInfoSlot::ExtendedInfo(info) => Ok(info),
            ClassInfoSlot::Canonical(table) => {
                let stored = self.memory.read_u64(table + layout::CLASS_INFO_UNION)?;
                match decode_class_info(stored) {
                    ClassInfoSlot::ExtendedInfo(info) => Ok(info),
                    other => Err(Error::UnsupportedLayout(format!(
                        "canonical table {table:#x} has non-extended class info: {other:?}"
                    ))),
                }
            }
            ClassInfoSlot::Unrecognized { .. } => unreachable!(),
        }
    }

    /// Element type handle; only meaningful when [`is_array`](Self::is_array).
    pub fn element_type_handle(&self) -> Result<Option<u64>> {
        if !self.is_array()? {
            return Ok(None);
        }
        Ok(Some(
            self.memory
                .read_u64(self.address + layout::ELEMENT_TYPE_HANDLE)?,
        ))
    }
}
