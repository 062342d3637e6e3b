//! Typed views over raw metadata records
//!
//! Each view is constructed from a bare address and reads through a
//! [`ReadMemory`](crate::memory::ReadMemory) handle using the offsets in
//! [`layout`](crate::memory::layout). Nothing validates that the address
//! points at a well-formed record; the contract is the same as a raw
//! pointer cast.
//!
//! Accessors come in two kinds and the split is deliberate:
//! - **pure offset reads**, computed entirely from the layout constants;
//! - **delegated calls**, which go through an engine routines table
//!   (resolved by the binding engine) because the algorithm is
//!   engine-version-dependent and must not be re-derived here.
//!
//! Every delegated accessor is marked as such in its doc comment.

mod field_desc;
mod method_desc;
mod method_table;

pub use field_desc::{FieldDescRoutines, FieldDescView, ProtectionLevel};
pub use method_desc::{MethodClassification, MethodDescRoutines, MethodDescView};
pub use method_table::{ClassInfoSlot, MethodTableView, decode_class_info};

use strum::FromRepr;

/// Element type code carried in metadata records (5-bit field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, strum::Display)]
#[repr(u8)]
pub enum ElementType {
    End = 0x00,
    Void = 0x01,
    Boolean = 0x02,
    Char = 0x03,
    I1 = 0x04,
    U1 = 0x05,
    I2 = 0x06,
    U2 = 0x07,
    I4 = 0x08,
    U4 = 0x09,
    I8 = 0x0A,
    U8 = 0x0B,
    R4 = 0x0C,
    R8 = 0x0D,
    String = 0x0E,
    Ptr = 0x0F,
    ByRef = 0x10,
    ValueType = 0x11,
    Class = 0x12,
    Var = 0x13,
    Array = 0x14,
    GenericInst = 0x15,
    TypedByRef = 0x16,
    I = 0x18,
    U = 0x19,
    FnPtr = 0x1B,
    Object = 0x1C,
    SzArray = 0x1D,
    MVar = 0x1E,
}

impl ElementType {
    /// Size in bytes when the type has a fixed width on a 64-bit host.
    ///
    /// `None` means the size is not decodable from the code alone and
    /// must come from the engine's own sizing routine.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Boolean | Self::I1 | Self::U1 => Some(1),
            Self::Char | Self::I2 | Self::U2 => Some(2),
            Self::I4 | Self::U4 | Self::R4 => Some(4),
            Self::I8 | Self::U8 | Self::R8 => Some(8),
            Self::String
            | Self::Ptr
            | Self::ByRef
            | Self::Class
            | Self::Array
            | Self::SzArray
            | Self::Object
            | Self::FnPtr
            | Self::I
            | Self::U => Some(8),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_from_code() {
        assert_eq!(ElementType::from_repr(0x08), Some(ElementType::I4));
        assert_eq!(ElementType::from_repr(0x1D), Some(ElementType::SzArray));
        assert_eq!(ElementType::from_repr(0x17), None);
        assert_eq!(ElementType::from_repr(0x1F), None);
    }

    #[test]
    fn test_fixed_sizes() {
        assert_eq!(ElementType::Boolean.fixed_size(), Some(1));
        assert_eq!(ElementType::Char.fixed_size(), Some(2));
        assert_eq!(ElementType::R8.fixed_size(), Some(8));
        assert_eq!(ElementType::Class.fixed_size(), Some(8));
        assert_eq!(ElementType::ValueType.fixed_size(), None);
    }
}
