//! Binding engine
//!
//! Turns a scope's declared imports into live bindings: every descriptor
//! is resolved to an address (pattern scan or symbol lookup), then each
//! resolved address is either wrapped in a callable stub or written over
//! a method's entry point. Binding a scope is all-or-nothing and
//! idempotent: one unresolved import aborts the whole scope before any
//! mutation, a failed patch rolls back the patches already applied, and
//! a scope found in the records is not resolved again.

mod stub;
mod table;

pub use stub::{BindingRecords, BoundImport, BoundImports, FnStub};
pub use table::{
    BindAction, ImportDescriptor, ImportDocument, ImportEntry, ImportTable, ImportTableBuilder,
    Resolution, load_imports, save_imports,
};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::module::{MatchSelection, ModuleProvider, ModuleScanner, ResolvedAddress, TEXT_SEGMENT};
use crate::patch::EntryPointPatcher;
use crate::symbols::SymbolSource;

pub struct BindingEngine<'a, P: ModuleProvider> {
    scanner: ModuleScanner<'a, P>,
    symbols: &'a dyn SymbolSource,
    patcher: Option<&'a EntryPointPatcher<'a>>,
}

impl<'a, P: ModuleProvider> BindingEngine<'a, P> {
    pub fn new(provider: &'a P, symbols: &'a dyn SymbolSource) -> Self {
        Self {
            scanner: ModuleScanner::new(provider),
            symbols,
            patcher: None,
        }
    }

    /// Required for tables containing entry-point redirections.
    pub fn with_patcher(mut self, patcher: &'a EntryPointPatcher<'a>) -> Self {
        self.patcher = Some(patcher);
        self
    }

    /// Policy for ambiguous pattern matches, forwarded to the scanner.
    pub fn with_selection(mut self, selection: MatchSelection) -> Self {
        self.scanner = self.scanner.with_selection(selection);
        self
    }

    /// Bind every import of `table`, recording the result in `records`.
    ///
    /// A no-op when the scope is already bound. On any failure the
    /// records are left without an entry for the scope, so the caller may
    /// retry with a fresh resolution pass.
    pub fn bind(&mut self, table: &ImportTable, records: &mut BindingRecords) -> Result<()> {
        if records.is_bound(&table.scope) {
            debug!("Scope {} already bound; skipping", table.scope);
            return Ok(());
        }

        debug!(
            "Binding scope {} ({} imports)",
            table.scope,
            table.imports.len()
        );

        // Resolve everything before mutating anything.
        let mut resolved = Vec::with_capacity(table.imports.len());
        for import in &table.imports {
            let address = self.resolve(table, import)?;
            debug!(
                "Resolved {}::{} to {:#x} ({:?})",
                table.scope, import.member, address.address, address.provenance
            );
            resolved.push(address);
        }

        let mut bound = BoundImports::default();
        for (import, address) in table.imports.iter().zip(resolved) {
            match &import.action {
                BindAction::Stub => {
                    bound.insert(
                        &import.member,
                        BoundImport {
                            stub: FnStub::new(address.address),
                            resolved: address,
                            patch: None,
                        },
                    );
                }
                BindAction::EntryPoint(target) => {
                    let patcher = self.patcher.ok_or_else(|| {
                        Error::RoutineNotBound("entry point patcher".to_string())
                    })?;
                    match patcher.set_entry_point(target, address.address) {
                        Ok(patch) => bound.insert(
                            &import.member,
                            BoundImport {
                                stub: FnStub::new(address.address),
                                resolved: address,
                                patch: Some(patch),
                            },
                        ),
                        Err(e) => {
                            self.rollback(&table.scope, &bound);
                            return Err(e);
                        }
                    }
                }
            }
        }

        records.insert(&table.scope, bound);
        Ok(())
    }

    /// Revert a scope's entry-point patches and forget its bindings.
    ///
    /// A patcher is only needed when the scope holds patches; stub-only
    /// scopes unbind on any engine. On error the records are untouched.
    pub fn unbind(&mut self, scope: &str, records: &mut BindingRecords) -> Result<()> {
        let Some(bound) = records.get(scope) else {
            return Ok(());
        };

        if bound.patches().next().is_some() {
            let patcher = self
                .patcher
                .ok_or_else(|| Error::RoutineNotBound("entry point patcher".to_string()))?;
            for patch in bound.patches() {
                patcher.revert(patch)?;
            }
        }

        records.remove(scope);
        debug!("Scope {} unbound", scope);
        Ok(())
    }

    fn resolve(&mut self, table: &ImportTable, import: &ImportDescriptor) -> Result<ResolvedAddress> {
        match &import.resolution {
            Resolution::Pattern {
                signature,
                text_segment_only,
            } => {
                if *text_segment_only {
                    self.scanner
                        .select_module_segment(&import.module, TEXT_SEGMENT)?;
                } else {
                    self.scanner.select_module(&import.module)?;
                }
                self.scanner.find_pattern(signature)
            }
            Resolution::Symbol(spec) => {
                let qualified =
                    spec.qualified_name(table.namespace.as_deref(), &table.scope, &import.member);
                self.symbols.resolve(&import.module, &qualified)
            }
        }
    }

    fn rollback(&self, scope: &str, bound: &BoundImports) {
        let Some(patcher) = self.patcher else {
            return;
        };
        for patch in bound.patches() {
            if let Err(e) = patcher.revert(patch) {
                warn!(
                    "Rollback of {:#x} in scope {} failed: {}",
                    patch.method_desc, scope, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    use crate::module::mock::MockModuleProvider;
    use crate::module::Provenance;
    use crate::patch::{
        EntryPointRoutines, MethodAttributes, PageProtection, PatchTarget, ProtectMemory,
    };

    #[derive(Default)]
    struct MockSymbols {
        entries: HashMap<String, u64>,
        calls: Cell<usize>,
    }

    impl MockSymbols {
        fn with(entries: &[(&str, u64)]) -> Self {
            Self {
                entries: entries
                    .iter()
                    .map(|(name, address)| (name.to_string(), *address))
                    .collect(),
                calls: Cell::new(0),
            }
        }
    }

    impl SymbolSource for MockSymbols {
        fn resolve(&self, module: &str, qualified: &str) -> Result<ResolvedAddress> {
            self.calls.set(self.calls.get() + 1);
            self.entries
                .get(qualified)
                .map(|&address| ResolvedAddress {
                    address,
                    module: module.to_string(),
                    provenance: Provenance::Symbol,
                })
                .ok_or_else(|| Error::SymbolNotFound(qualified.to_string()))
        }
    }

    struct NullProtection;

    impl ProtectMemory for NullProtection {
        fn change_protection(
            &self,
            _address: u64,
            _len: usize,
            _protection: PageProtection,
        ) -> Result<PageProtection> {
            Ok(PageProtection::ExecuteRead)
        }
    }

    struct MockEntryPoints {
        entry_points: RefCell<HashMap<u64, u64>>,
        fail_for: Option<u64>,
    }

    impl MockEntryPoints {
        fn new(methods: &[(u64, u64)]) -> Self {
            Self {
                entry_points: RefCell::new(methods.iter().copied().collect()),
                fail_for: None,
            }
        }
    }

    impl EntryPointRoutines for MockEntryPoints {
        fn stable_entry_point(&self, method_desc: u64) -> Result<u64> {
            Ok(*self.entry_points.borrow().get(&method_desc).unwrap_or(&0))
        }

        fn set_stable_entry_point(&self, method_desc: u64, entry_point: u64) -> Result<()> {
            if self.fail_for == Some(method_desc) {
                return Err(Error::MemoryReadFailed {
                    address: method_desc,
                    message: "write refused".to_string(),
                });
            }
            self.entry_points
                .borrow_mut()
                .insert(method_desc, entry_point);
            Ok(())
        }
    }

    fn provider_with_pattern() -> MockModuleProvider {
        let mut bytes = vec![0u8; 0x1000];
        bytes[0x100..0x104].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let mut provider = MockModuleProvider::new();
        provider.add_module("engine.dll", 0x2000, 0x1000, &bytes);
        provider.add_segment("engine.dll", TEXT_SEGMENT, 0x2000, &bytes);
        provider
    }

    #[test]
    fn test_bind_resolves_pattern_and_symbol_imports() {
        let provider = provider_with_pattern();
        let symbols = MockSymbols::with(&[("MethodDesc::GetMemberDef", 0x2400)]);
        let mut engine = BindingEngine::new(&provider, &symbols);
        let mut records = BindingRecords::new();

        let table = ImportTable::builder("MethodDesc")
            .import(
                ImportDescriptor::pattern("SizeOf", "engine.dll", "DE AD BE EF").unwrap(),
            )
            .import(ImportDescriptor::symbol("GetMemberDef", "engine.dll"))
            .build();

        engine.bind(&table, &mut records).unwrap();

        let bound = records.get("MethodDesc").unwrap();
        assert_eq!(bound.len(), 2);
        assert_eq!(bound.stub("SizeOf").unwrap().address(), 0x2100);
        assert_eq!(bound.stub("GetMemberDef").unwrap().address(), 0x2400);
        assert_eq!(
            bound.get("GetMemberDef").unwrap().resolved.provenance,
            Provenance::Symbol
        );
    }

    #[test]
    fn test_rebind_is_a_no_op() {
        let provider = provider_with_pattern();
        let symbols = MockSymbols::default();
        let mut engine = BindingEngine::new(&provider, &symbols);
        let mut records = BindingRecords::new();

        let table = ImportTable::builder("Scanner")
            .import(
                ImportDescriptor::pattern("Target", "engine.dll", "DE AD BE EF").unwrap(),
            )
            .build();

        engine.bind(&table, &mut records).unwrap();
        let scans_after_first = provider.snapshot_calls.get();
        assert!(scans_after_first > 0);

        engine.bind(&table, &mut records).unwrap();
        assert_eq!(provider.snapshot_calls.get(), scans_after_first);
        assert_eq!(records.get("Scanner").unwrap().len(), 1);
    }

    #[test]
    fn test_one_unresolved_import_aborts_the_scope() {
        let provider = provider_with_pattern();
        let symbols = MockSymbols::default();
        let mut engine = BindingEngine::new(&provider, &symbols);
        let mut records = BindingRecords::new();

        let table = ImportTable::builder("MethodDesc")
            .import(
                ImportDescriptor::pattern("Found", "engine.dll", "DE AD BE EF").unwrap(),
            )
            .import(ImportDescriptor::symbol("Missing", "engine.dll"))
            .build();

        let err = engine.bind(&table, &mut records).unwrap_err();
        assert!(matches!(err, Error::SymbolNotFound(_)));
        assert!(!records.is_bound("MethodDesc"));
    }

    #[test]
    fn test_failed_patch_rolls_back_earlier_patches() {
        let provider = provider_with_pattern();
        let symbols = MockSymbols::with(&[
            ("Hooks::First", 0x2200),
            ("Hooks::Second", 0x2300),
        ]);
        let protection = NullProtection;
        let mut routines = MockEntryPoints::new(&[(0x9000, 0xAAAA), (0x9100, 0xBBBB)]);
        routines.fail_for = Some(0x9100);
        let patcher = EntryPointPatcher::new(&protection, &routines);

        let mut engine = BindingEngine::new(&provider, &symbols).with_patcher(&patcher);
        let mut records = BindingRecords::new();

        let table = ImportTable::builder("Hooks")
            .import(ImportDescriptor::symbol("First", "engine.dll").redirect(PatchTarget {
                method_desc: 0x9000,
                attributes: MethodAttributes(0),
            }))
            .import(ImportDescriptor::symbol("Second", "engine.dll").redirect(PatchTarget {
                method_desc: 0x9100,
                attributes: MethodAttributes(0),
            }))
            .build();

        assert!(engine.bind(&table, &mut records).is_err());
        assert!(!records.is_bound("Hooks"));
        // First patch was applied, then reverted during rollback.
        assert_eq!(routines.stable_entry_point(0x9000).unwrap(), 0xAAAA);
    }

    #[test]
    fn test_unbind_reverts_patches_and_forgets_the_scope() {
        let provider = provider_with_pattern();
        let symbols = MockSymbols::with(&[("Hooks::First", 0x2200)]);
        let protection = NullProtection;
        let routines = MockEntryPoints::new(&[(0x9000, 0xAAAA)]);
        let patcher = EntryPointPatcher::new(&protection, &routines);

        let mut engine = BindingEngine::new(&provider, &symbols).with_patcher(&patcher);
        let mut records = BindingRecords::new();

        let table = ImportTable::builder("Hooks")
            .import(ImportDescriptor::symbol("First", "engine.dll").redirect(PatchTarget {
                method_desc: 0x9000,
                attributes: MethodAttributes(0),
            }))
            .build();

        engine.bind(&table, &mut records).unwrap();
        assert_eq!(routines.stable_entry_point(0x9000).unwrap(), 0x2200);

        engine.unbind("Hooks", &mut records).unwrap();
        assert_eq!(routines.stable_entry_point(0x9000).unwrap(), 0xAAAA);
        assert!(!records.is_bound("Hooks"));
    }

    #[test]
    fn test_unbind_stub_only_scope_needs_no_patcher() {
        let provider = provider_with_pattern();
        let symbols = MockSymbols::default();
        let mut engine = BindingEngine::new(&provider, &symbols);
        let mut records = BindingRecords::new();

        let table = ImportTable::builder("StubOnly")
            .import(
                ImportDescriptor::pattern("Target", "engine.dll", "DE AD BE EF").unwrap(),
            )
            .build();

        engine.bind(&table, &mut records).unwrap();
        engine.unbind("StubOnly", &mut records).unwrap();
        assert!(!records.is_bound("StubOnly"));
    }

    #[test]
    fn test_unbind_with_patches_but_no_patcher_keeps_the_scope() {
        let provider = provider_with_pattern();
        let symbols = MockSymbols::with(&[("Hooks::First", 0x2200)]);
        let protection = NullProtection;
        let routines = MockEntryPoints::new(&[(0x9000, 0xAAAA)]);
        let patcher = EntryPointPatcher::new(&protection, &routines);
        let mut records = BindingRecords::new();

        let table = ImportTable::builder("Hooks")
            .import(ImportDescriptor::symbol("First", "engine.dll").redirect(PatchTarget {
                method_desc: 0x9000,
                attributes: MethodAttributes(0),
            }))
            .build();

        BindingEngine::new(&provider, &symbols)
            .with_patcher(&patcher)
            .bind(&table, &mut records)
            .unwrap();

        let mut bare = BindingEngine::new(&provider, &symbols);
        let err = bare.unbind("Hooks", &mut records).unwrap_err();
        assert!(matches!(err, Error::RoutineNotBound(_)));
        assert!(records.is_bound("Hooks"));
        assert_eq!(routines.stable_entry_point(0x9000).unwrap(), 0x2200);
    }

    #[test]
    fn test_entry_point_import_without_patcher_is_rejected() {
        let provider = provider_with_pattern();
        let symbols = MockSymbols::with(&[("Hooks::First", 0x2200)]);
        let mut engine = BindingEngine::new(&provider, &symbols);
        let mut records = BindingRecords::new();

        let table = ImportTable::builder("Hooks")
            .import(ImportDescriptor::symbol("First", "engine.dll").redirect(PatchTarget {
                method_desc: 0x9000,
                attributes: MethodAttributes(0),
            }))
            .build();

        let err = engine.bind(&table, &mut records).unwrap_err();
        assert!(matches!(err, Error::RoutineNotBound(_)));
        assert!(!records.is_bound("Hooks"));
    }
}
