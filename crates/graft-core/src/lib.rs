//! graft-core: runtime introspection and patching for a managed
//! execution engine.
//!
//! The crate locates un-exported engine routines inside loaded modules
//! (byte-signature scanning and debug-symbol lookup), binds them to
//! callable stubs or redirected entry points, and overlays typed views
//! over the engine's raw metadata records.
//!
//! Everything is synchronous and single-threaded by design: binding and
//! patching manipulate process-global native resources with no safe
//! concurrent story.

pub mod binding;
pub mod context;
pub mod error;
pub mod memory;
pub mod module;
pub mod overlay;
pub mod patch;
pub mod pattern;
pub mod symbols;

pub use binding::{
    BindAction, BindingEngine, BindingRecords, BoundImport, BoundImports, FnStub,
    ImportDescriptor, ImportDocument, ImportEntry, ImportTable, Resolution, load_imports,
    save_imports,
};
pub use context::{ContextSymbols, GraftContext};
pub use error::{Error, Result};
pub use memory::ReadMemory;
pub use module::{
    MatchSelection, ModuleInfo, ModuleProvider, ModuleScanner, Provenance, ResolvedAddress,
    SegmentSnapshot, TEXT_SEGMENT,
};
pub use overlay::{
    ClassInfoSlot, ElementType, FieldDescView, MethodClassification, MethodDescView,
    MethodTableView, ProtectionLevel,
};
pub use patch::{
    EntryPointPatcher, EntryPointRoutines, MethodAttributes, PageProtection, PatchRecord,
    PatchTarget, ProtectMemory,
};
pub use pattern::{Signature, SignatureEntry, SignatureSet, load_signatures, save_signatures};
pub use symbols::{
    SCOPE_OPERATOR, SymbolEntry, SymbolFile, SymbolSource, SymbolSpec, SymbolStore,
    load_symbol_file, save_symbol_file,
};

#[cfg(target_os = "windows")]
pub use memory::ProcessMemory;
#[cfg(target_os = "windows")]
pub use module::LoadedModuleProvider;
#[cfg(target_os = "windows")]
pub use patch::VirtualProtection;
#[cfg(target_os = "windows")]
pub use symbols::DbgHelpStore;
