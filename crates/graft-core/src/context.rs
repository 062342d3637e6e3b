//! Process-wide toolkit context
//!
//! One [`GraftContext`] per process replaces ambient global state: it
//! owns the module provider, the open symbol sessions and the binding
//! records, and every component that needs them is handed a borrow.
//! [`shutdown`](GraftContext::shutdown) is the documented teardown step;
//! until then the sessions stay open because reloading symbol data is
//! expensive and module identities never change within a process.

use tracing::{debug, warn};

use crate::binding::{BindingEngine, BindingRecords, ImportTable};
use crate::error::{Error, Result};
use crate::module::{MatchSelection, ModuleProvider, Provenance, ResolvedAddress};
use crate::patch::EntryPointPatcher;
use crate::symbols::{SymbolSource, SymbolStore};

/// Symbol front end over the context's open sessions.
///
/// Resolution order: the module must be loaded (checked first, before
/// any symbol work), a session for it must be open, and the resulting
/// address must fall inside the module's mapped range.
pub struct ContextSymbols<'a, P> {
    provider: &'a P,
    stores: &'a [Box<dyn SymbolStore>],
}

impl<P: ModuleProvider> SymbolSource for ContextSymbols<'_, P> {
    fn resolve(&self, module: &str, qualified: &str) -> Result<ResolvedAddress> {
        let info = self.provider.module(module)?;

        let store = self
            .stores
            .iter()
            .find(|s| s.module().eq_ignore_ascii_case(module))
            .ok_or_else(|| Error::SymbolStoreUnavailable {
                module: module.to_string(),
                message: "no symbol session open".to_string(),
            })?;

        let rva = store.resolve(qualified)?;
        let address = info.base + rva;
        if !info.contains(address) {
            return Err(Error::AddressOutOfModule {
                module: module.to_string(),
                address,
            });
        }

        Ok(ResolvedAddress {
            address,
            module: info.name,
            provenance: Provenance::Symbol,
        })
    }
}

pub struct GraftContext<P: ModuleProvider> {
    provider: P,
    stores: Vec<Box<dyn SymbolStore>>,
    records: BindingRecords,
    selection: MatchSelection,
}

impl<P: ModuleProvider> GraftContext<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            stores: Vec::new(),
            records: BindingRecords::new(),
            selection: MatchSelection::default(),
        }
    }

    pub fn with_selection(mut self, selection: MatchSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn records(&self) -> &BindingRecords {
        &self.records
    }

    pub fn is_bound(&self, scope: &str) -> bool {
        self.records.is_bound(scope)
    }

    /// Register an open symbol session. One session per module; a second
    /// registration for the same module replaces the first (which is
    /// closed).
    pub fn add_symbol_store(&mut self, store: Box<dyn SymbolStore>) {
        if let Some(existing) = self
            .stores
            .iter_mut()
            .find(|s| s.module().eq_ignore_ascii_case(store.module()))
        {
            if let Err(e) = existing.close() {
                warn!("Closing replaced symbol session failed: {}", e);
            }
            *existing = store;
            return;
        }
        debug!("Symbol session registered for {}", store.module());
        self.stores.push(store);
    }

    pub fn symbols(&self) -> ContextSymbols<'_, P> {
        ContextSymbols {
            provider: &self.provider,
            stores: &self.stores,
        }
    }

    /// Bind a scope's imports. No-op when already bound.
    pub fn bind(&mut self, table: &ImportTable) -> Result<()> {
        let symbols = ContextSymbols {
            provider: &self.provider,
            stores: &self.stores,
        };
        let mut engine =
            BindingEngine::new(&self.provider, &symbols).with_selection(self.selection);
        engine.bind(table, &mut self.records)
    }

    /// Bind a scope whose imports include entry-point redirections.
    pub fn bind_with_patcher(
        &mut self,
        table: &ImportTable,
        patcher: &EntryPointPatcher<'_>,
    ) -> Result<()> {
        let symbols = ContextSymbols {
            provider: &self.provider,
            stores: &self.stores,
        };
        let mut engine = BindingEngine::new(&self.provider, &symbols)
            .with_selection(self.selection)
            .with_patcher(patcher);
        engine.bind(table, &mut self.records)
    }

    /// Revert a scope's patches and forget its bindings.
    pub fn unbind(&mut self, scope: &str, patcher: &EntryPointPatcher<'_>) -> Result<()> {
        let symbols = ContextSymbols {
            provider: &self.provider,
            stores: &self.stores,
        };
        let mut engine = BindingEngine::new(&self.provider, &symbols)
            .with_selection(self.selection)
            .with_patcher(patcher);
        engine.unbind(scope, &mut self.records)
    }

    /// Close every open symbol session. Call once at process exit.
    pub fn shutdown(&mut self) -> Result<()> {
        let mut first_error = None;
        for mut store in self.stores.drain(..) {
            debug!("Closing symbol session for {}", store.module());
            if let Err(e) = store.close() {
                warn!("Symbol session close failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::ImportDescriptor;
    use crate::module::mock::MockModuleProvider;
    use crate::symbols::SymbolFile;

    fn context_with_store() -> GraftContext<MockModuleProvider> {
        let mut provider = MockModuleProvider::new();
        provider.add_module("engine.dll", 0x2000, 0x1000, &vec![0u8; 0x1000]);

        let mut file = SymbolFile::new("engine.dll", "test");
        file.insert("MethodDesc::SizeOf", 0x140);
        file.insert("MethodDesc::WayOutside", 0x4_0000);

        let mut context = GraftContext::new(provider);
        context.add_symbol_store(Box::new(file));
        context
    }

    #[test]
    fn test_symbol_resolution_adds_module_base() {
        let context = context_with_store();
        let resolved = context
            .symbols()
            .resolve("engine.dll", "MethodDesc::SizeOf")
            .unwrap();
        assert_eq!(resolved.address, 0x2140);
        assert_eq!(resolved.module, "engine.dll");
        assert_eq!(resolved.provenance, Provenance::Symbol);
    }

    #[test]
    fn test_missing_module_checked_before_store() {
        let context = context_with_store();
        let err = context
            .symbols()
            .resolve("other.dll", "MethodDesc::SizeOf")
            .unwrap_err();
        assert!(matches!(err, Error::ModuleNotLoaded(_)));
    }

    #[test]
    fn test_module_without_session() {
        let mut provider = MockModuleProvider::new();
        provider.add_module("engine.dll", 0x2000, 0x1000, &[0u8; 16]);
        let context = GraftContext::new(provider);

        let err = context
            .symbols()
            .resolve("engine.dll", "anything")
            .unwrap_err();
        assert!(matches!(err, Error::SymbolStoreUnavailable { .. }));
    }

    #[test]
    fn test_out_of_module_rva_is_rejected() {
        let context = context_with_store();
        let err = context
            .symbols()
            .resolve("engine.dll", "MethodDesc::WayOutside")
            .unwrap_err();
        assert!(matches!(err, Error::AddressOutOfModule { .. }));
    }

    #[test]
    fn test_bind_through_context() {
        let mut context = context_with_store();
        let table = ImportTable::builder("MethodDesc")
            .import(ImportDescriptor::symbol("SizeOf", "engine.dll"))
            .build();

        context.bind(&table).unwrap();
        assert!(context.is_bound("MethodDesc"));
        assert_eq!(
            context
                .records()
                .get("MethodDesc")
                .unwrap()
                .stub("SizeOf")
                .unwrap()
                .address(),
            0x2140
        );

        // Second bind is a no-op, not an error.
        context.bind(&table).unwrap();
    }

    #[test]
    fn test_shutdown_drains_sessions() {
        let mut context = context_with_store();
        context.shutdown().unwrap();

        let err = context
            .symbols()
            .resolve("engine.dll", "MethodDesc::SizeOf")
            .unwrap_err();
        assert!(matches!(err, Error::SymbolStoreUnavailable { .. }));
    }
}
