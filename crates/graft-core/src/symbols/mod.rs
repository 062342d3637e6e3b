//! Debug-symbol resolution
//!
//! A [`SymbolStore`] is an opened session against one module's symbol
//! data and resolves a qualified name to a module-relative offset (RVA).
//! Two back ends exist: the portable [`SymbolFile`] cache and, on
//! Windows, the OS debug-help store. Both return RVAs so callers never
//! care which one answered.

mod file;

#[cfg(target_os = "windows")]
mod windows;

pub use file::{SymbolEntry, SymbolFile, load_symbol_file, save_symbol_file};

#[cfg(target_os = "windows")]
pub use windows::DbgHelpStore;

use crate::error::Result;
use crate::module::ResolvedAddress;

/// Scope-qualification operator in symbol names.
pub const SCOPE_OPERATOR: &str = "::";

/// Naming flags for one imported symbol, matching the import descriptor
/// surface: an explicit symbol name plus the qualification switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolSpec {
    /// Explicit symbol name; defaults to the member name when absent.
    pub symbol: Option<String>,
    /// The explicit name is already fully qualified; use it verbatim.
    pub fully_qualified: bool,
    /// Use the bare member name with no scope prefix.
    pub member_name_only: bool,
    /// Skip the namespace prefix even when the table declares one.
    pub ignore_namespace: bool,
}

impl SymbolSpec {
    pub fn named(symbol: &str) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            ..Self::default()
        }
    }

    /// Assemble the full lookup name for a member of `scope`.
    ///
    /// Auto-resolution produces `Scope::member`; an explicit symbol
    /// replaces the member part; the flags bypass scope or namespace
    /// qualification entirely. When the flags conflict, the explicit
    /// symbol takes precedence over `member_name_only`, and a
    /// `fully_qualified` name is never namespace-prefixed.
    pub fn qualified_name(&self, namespace: Option<&str>, scope: &str, member: &str) -> String {
        let base = if self.fully_qualified && self.symbol.is_some() && !self.member_name_only {
            self.symbol.clone().unwrap()
        } else if self.member_name_only && self.symbol.is_none() {
            member.to_string()
        } else if let Some(symbol) = &self.symbol {
            format!("{scope}{SCOPE_OPERATOR}{symbol}")
        } else {
            format!("{scope}{SCOPE_OPERATOR}{member}")
        };

        match namespace {
            Some(ns) if !self.ignore_namespace && !self.fully_qualified => {
                format!("{ns}{SCOPE_OPERATOR}{base}")
            }
            _ => base,
        }
    }
}

/// An opened symbol session for one module.
///
/// Sessions are scoped: `close` releases the underlying store. The one
/// exception is the primary engine module's session, which the context
/// keeps open for the life of the process (reloading it is expensive and
/// the module's identity never changes).
pub trait SymbolStore {
    /// Module this session was opened against.
    fn module(&self) -> &str;

    /// Resolve a qualified name to an offset from the module base.
    fn resolve(&self, qualified: &str) -> Result<u64>;

    /// Release the session. Dropping without closing is tolerated but
    /// logged by implementations that hold OS handles.
    fn close(&mut self) -> Result<()>;
}

/// Resolution front end handed to the binding engine: module + qualified
/// name in, absolute in-module address out.
pub trait SymbolSource {
    fn resolve(&self, module: &str, qualified: &str) -> Result<ResolvedAddress>;
}
