//! Bound-import state
//!
//! [`FnStub`] wraps a resolved address for casting to a concrete fn
//! type; [`BindingRecords`] is the per-scope ledger that makes binding
//! idempotent.

use std::collections::HashMap;
use std::mem;

use crate::module::ResolvedAddress;
use crate::patch::PatchRecord;

/// A resolved routine address, castable to a concrete fn type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FnStub {
    address: u64,
}

impl FnStub {
    pub fn new(address: u64) -> Self {
        Self { address }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    /// Reinterpret the address as a function pointer.
    ///
    /// # Safety
    ///
    /// The caller asserts that the routine at this address has exactly
    /// the ABI and signature of `F`, and that the module it lives in
    /// stays loaded for as long as the returned pointer is used.
    pub unsafe fn cast<F: Copy>(&self) -> F {
        const {
            assert!(mem::size_of::<F>() == mem::size_of::<u64>());
        }
        unsafe { mem::transmute_copy::<u64, F>(&self.address) }
    }
}

/// One completed binding.
#[derive(Debug, Clone)]
pub struct BoundImport {
    pub stub: FnStub,
    pub resolved: ResolvedAddress,
    /// Present when the binding redirected an entry point.
    pub patch: Option<PatchRecord>,
}

/// All completed bindings of one scope.
#[derive(Debug, Clone, Default)]
pub struct BoundImports {
    members: HashMap<String, BoundImport>,
}

impl BoundImports {
    pub fn insert(&mut self, member: &str, import: BoundImport) {
        self.members.insert(member.to_string(), import);
    }

    pub fn get(&self, member: &str) -> Option<&BoundImport> {
        self.members.get(member)
    }

    pub fn stub(&self, member: &str) -> Option<FnStub> {
        self.members.get(member).map(|b| b.stub)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn patches(&self) -> impl Iterator<Item = &PatchRecord> {
        self.members.values().filter_map(|b| b.patch.as_ref())
    }
}

/// Scope-keyed ledger of completed bindings.
///
/// A scope appears here only once fully bound; a failed bind leaves no
/// entry, so the caller can retry the whole resolution pass.
#[derive(Debug, Default)]
pub struct BindingRecords {
    scopes: HashMap<String, BoundImports>,
}

impl BindingRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self, scope: &str) -> bool {
        self.scopes.contains_key(scope)
    }

    pub fn get(&self, scope: &str) -> Option<&BoundImports> {
        self.scopes.get(scope)
    }

    pub fn insert(&mut self, scope: &str, imports: BoundImports) {
        self.scopes.insert(scope.to_string(), imports);
    }

    pub fn remove(&mut self, scope: &str) -> Option<BoundImports> {
        self.scopes.remove(scope)
    }

    pub fn bound_scopes(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }
}
