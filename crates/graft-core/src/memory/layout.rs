//! Record layout constants for the engine's private metadata structures
//!
//! All offsets describe the 64-bit layout. These values are version-fragile
//! by nature; they are centralized here so that a layout change in a new
//! engine build is a one-file edit.

/// Method table: the engine's per-type runtime descriptor.
pub mod method_table {
    /// Combined flags dword. The low word doubles as the component size
    /// when the type carries one (arrays and strings).
    pub const FLAGS: u64 = 0x0;
    pub const COMPONENT_SIZE: u64 = 0x0;
    pub const BASE_SIZE: u64 = 0x4;
    pub const FLAGS2: u64 = 0x8;
    pub const TOKEN: u64 = 0xA;
    pub const NUM_VIRTUALS: u64 = 0xC;
    pub const NUM_INTERFACES: u64 = 0xE;
    pub const PARENT: u64 = 0x10;
    pub const LOADER_MODULE: u64 = 0x18;
    pub const WRITEABLE_DATA: u64 = 0x20;

    /// Tagged union slot: either a pointer to the extended-class-info block
    /// or a tagged pointer to the canonical method table.
    pub const CLASS_INFO_UNION: u64 = 0x28;

    /// First multipurpose slot; holds the element type handle when the
    /// type is an array.
    pub const ELEMENT_TYPE_HANDLE: u64 = 0x30;

    /// Low bits of [`CLASS_INFO_UNION`] selecting the pointee kind.
    pub const UNION_TAG_MASK: u64 = 0x3;
    pub const UNION_TAG_EXTENDED_INFO: u64 = 0x0;
    pub const UNION_TAG_CANONICAL: u64 = 0x2;

    /// Byte adjustment applied to a canonical-tagged union pointer before
    /// it is a valid method-table address.
    pub const CANONICAL_TAG_ADJUST: u64 = 0x2;

    // Flags dword bits.
    pub const FLAG_ARRAY: u32 = 0x0008_0000;
    pub const FLAG_HAS_INDIRECT_PARENT: u32 = 0x0010_0000;
    pub const FLAG_CONTAINS_POINTERS: u32 = 0x0100_0000;
    pub const FLAG_HAS_COMPONENT_SIZE: u32 = 0x8000_0000;
}

/// Field descriptor: one packed record per field.
pub mod field_desc {
    pub const ENCLOSING_TYPE: u64 = 0x0;
    pub const DWORD1: u64 = 0x8;
    pub const DWORD2: u64 = 0xC;

    /// Total record size. Also used as a scan offset guess when walking
    /// field descriptor lists.
    pub const RECORD_SIZE: u64 = 0x10;

    // dword1: member-index(24) | static(1) | thread-local(1) | rva(1)
    //         | protection(3) | requires-full-token(1)
    pub const MEMBER_INDEX_MASK: u32 = 0x00FF_FFFF;
    pub const IS_STATIC_BIT: u32 = 24;
    pub const IS_THREAD_LOCAL_BIT: u32 = 25;
    pub const IS_RVA_BIT: u32 = 26;
    pub const PROTECTION_SHIFT: u32 = 27;
    pub const PROTECTION_MASK: u32 = 0x7;
    pub const REQUIRES_FULL_TOKEN_BIT: u32 = 30;

    /// Member-index bits that are valid when the packed layout is in use
    /// (requires-full-token bit clear). The remaining bits hold a name
    /// hash and must not leak into the token.
    pub const PACKED_INDEX_MASK: u32 = 0x0001_FFFF;

    // dword2: offset(27) | element-type(5)
    pub const OFFSET_MASK: u32 = 0x07FF_FFFF;
    pub const ELEMENT_TYPE_SHIFT: u32 = 27;
    pub const ELEMENT_TYPE_MASK: u32 = 0x1F;

    /// Token-type tag OR'd onto a field's member index to form the full
    /// metadata token.
    pub const FIELD_TOKEN_TYPE: u32 = 0x0400_0000;
}

/// Method descriptor: one packed record per method.
pub mod method_desc {
    pub const FLAGS3_AND_TOKEN_REMAINDER: u64 = 0x0;
    pub const CHUNK_INDEX: u64 = 0x2;
    pub const FLAGS2: u64 = 0x3;
    pub const SLOT_NUMBER: u64 = 0x4;
    pub const FLAGS: u64 = 0x6;

    /// Function pointer slot. Valid only for non-virtual, non-abstract,
    /// non-generic methods; everything else must go through the engine's
    /// own decoding routines.
    pub const FUNCTION_POINTER: u64 = 0x8;

    /// Size of the fixed portion of the record (the optional slots behind
    /// it are what make the true size engine-version-dependent).
    pub const RECORD_SIZE: u64 = 0x10;

    /// Records within a chunk are aligned to `1 << ALIGNMENT_SHIFT` bytes.
    pub const ALIGNMENT_SHIFT: u32 = 3;
    pub const ALIGNMENT: u64 = 1 << ALIGNMENT_SHIFT;

    /// Size of the chunk header that precedes the first record of a chunk.
    pub const CHUNK_HEADER_SIZE: u64 = 0x18;

    // flags word (u16)
    pub const CLASSIFICATION_MASK: u16 = 0x0007;
    pub const FLAG_HAS_NON_VTABLE_SLOT: u16 = 0x0008;
    pub const FLAG_STATIC: u16 = 0x0020;

    // flags2 byte
    pub const FLAG2_HAS_STABLE_ENTRY_POINT: u8 = 0x01;
    pub const FLAG2_HAS_PRECODE: u8 = 0x02;
    pub const FLAG2_IS_UNBOXING_STUB: u8 = 0x04;
}
