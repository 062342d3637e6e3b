//! Import declarations
//!
//! An [`ImportTable`] is the statically-constructed list of everything a
//! declaring scope needs bound: each [`ImportDescriptor`] names a member,
//! the module that hosts it, how to resolve it (byte signature or debug
//! symbol) and what binding to perform with the resolved address.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::patch::PatchTarget;
use crate::pattern::Signature;
use crate::symbols::SymbolSpec;

/// How an import's address is located.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Scan the module (or just its code segment) for a byte signature.
    Pattern {
        signature: Signature,
        text_segment_only: bool,
    },
    /// Look the name up in the module's debug symbols.
    Symbol(SymbolSpec),
}

/// What to do with the resolved address.
#[derive(Debug, Clone)]
pub enum BindAction {
    /// Wire a callable stub to the address.
    Stub,
    /// Overwrite the target method's stable entry point with the address.
    EntryPoint(PatchTarget),
}

#[derive(Debug, Clone)]
pub struct ImportDescriptor {
    /// Declaring member name; also the default symbol name.
    pub member: String,
    /// Module hosting the target routine.
    pub module: String,
    pub resolution: Resolution,
    pub action: BindAction,
}

impl ImportDescriptor {
    /// Pattern-resolved import scanning the module's code segment.
    pub fn pattern(member: &str, module: &str, pattern: &str) -> Result<Self> {
        Ok(Self {
            member: member.to_string(),
            module: module.to_string(),
            resolution: Resolution::Pattern {
                signature: Signature::parse(pattern)?,
                text_segment_only: true,
            },
            action: BindAction::Stub,
        })
    }

    /// Symbol-resolved import with auto qualification (`Scope::member`).
    pub fn symbol(member: &str, module: &str) -> Self {
        Self {
            member: member.to_string(),
            module: module.to_string(),
            resolution: Resolution::Symbol(SymbolSpec::default()),
            action: BindAction::Stub,
        }
    }

    pub fn with_offset_guess(mut self, offset_guess: i64) -> Self {
        if let Resolution::Pattern { signature, .. } = &mut self.resolution {
            signature.offset_guess = offset_guess;
        }
        self
    }

    /// Scan the whole mapped module instead of only the code segment.
    pub fn whole_module(mut self) -> Self {
        if let Resolution::Pattern {
            text_segment_only, ..
        } = &mut self.resolution
        {
            *text_segment_only = false;
        }
        self
    }

    pub fn with_symbol_spec(mut self, spec: SymbolSpec) -> Self {
        self.resolution = Resolution::Symbol(spec);
        self
    }

    /// Bind by redirecting `target`'s entry point instead of keeping a
    /// stub.
    pub fn redirect(mut self, target: PatchTarget) -> Self {
        self.action = BindAction::EntryPoint(target);
        self
    }
}

/// All imports of one declaring scope, bound together all-or-nothing.
#[derive(Debug, Clone)]
pub struct ImportTable {
    pub scope: String,
    /// Namespace prefix for symbol qualification, when the module's
    /// symbols carry one.
    pub namespace: Option<String>,
    pub imports: Vec<ImportDescriptor>,
}

impl ImportTable {
    pub fn builder(scope: &str) -> ImportTableBuilder {
        ImportTableBuilder {
            scope: scope.to_string(),
            namespace: None,
            imports: Vec::new(),
        }
    }
}

pub struct ImportTableBuilder {
    scope: String,
    namespace: Option<String>,
    imports: Vec<ImportDescriptor>,
}

impl ImportTableBuilder {
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    pub fn import(mut self, descriptor: ImportDescriptor) -> Self {
        self.imports.push(descriptor);
        self
    }

    pub fn build(self) -> ImportTable {
        ImportTable {
            scope: self.scope,
            namespace: self.namespace,
            imports: self.imports,
        }
    }
}

/// One import in an on-disk import document. Either `pattern` or
/// `symbol` naming fields; `pattern` wins when both are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportEntry {
    pub member: String,
    pub module: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub offset_guess: i64,
    #[serde(default)]
    pub whole_module: bool,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub fully_qualified: bool,
    #[serde(default)]
    pub member_name_only: bool,
    #[serde(default)]
    pub ignore_namespace: bool,
}

/// On-disk import table for one scope. Only stub imports are
/// persistable; entry-point redirections carry live addresses and are
/// always built in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportDocument {
    pub scope: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub imports: Vec<ImportEntry>,
}

impl ImportDocument {
    pub fn into_table(self) -> Result<ImportTable> {
        let mut builder = ImportTable::builder(&self.scope);
        if let Some(namespace) = &self.namespace {
            builder = builder.namespace(namespace);
        }

        for entry in self.imports {
            let descriptor = if let Some(pattern) = &entry.pattern {
                let mut import =
                    ImportDescriptor::pattern(&entry.member, &entry.module, pattern)?
                        .with_offset_guess(entry.offset_guess);
                if entry.whole_module {
                    import = import.whole_module();
                }
                import
            } else {
                ImportDescriptor::symbol(&entry.member, &entry.module).with_symbol_spec(
                    SymbolSpec {
                        symbol: entry.symbol.clone(),
                        fully_qualified: entry.fully_qualified,
                        member_name_only: entry.member_name_only,
                        ignore_namespace: entry.ignore_namespace,
                    },
                )
            };
            builder = builder.import(descriptor);
        }

        Ok(builder.build())
    }
}

pub fn load_imports<P: AsRef<Path>>(path: P) -> Result<ImportDocument> {
    let content = fs::read_to_string(path)?;
    let document = serde_json::from_str(&content)?;
    Ok(document)
}

pub fn save_imports<P: AsRef<Path>>(path: P, document: &ImportDocument) -> Result<()> {
    let content = serde_json::to_string_pretty(document)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_import_defaults_to_text_segment() {
        let import = ImportDescriptor::pattern("SizeOf", "engine.dll", "48 8B ?? 05").unwrap();
        match &import.resolution {
            Resolution::Pattern {
                signature,
                text_segment_only,
            } => {
                assert_eq!(signature.len(), 4);
                assert!(*text_segment_only);
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
        assert!(matches!(import.action, BindAction::Stub));
    }

    #[test]
    fn test_builder_collects_imports_in_order() {
        let table = ImportTable::builder("MethodDesc")
            .namespace("clr")
            .import(ImportDescriptor::symbol("GetMemberDef", "engine.dll"))
            .import(
                ImportDescriptor::pattern("SizeOf", "engine.dll", "40 53 48 83 EC 20")
                    .unwrap()
                    .with_offset_guess(-5),
            )
            .build();

        assert_eq!(table.scope, "MethodDesc");
        assert_eq!(table.namespace.as_deref(), Some("clr"));
        assert_eq!(table.imports.len(), 2);
        assert_eq!(table.imports[0].member, "GetMemberDef");
        match &table.imports[1].resolution {
            Resolution::Pattern { signature, .. } => assert_eq!(signature.offset_guess, -5),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn test_import_document_roundtrip() {
        let document = ImportDocument {
            scope: "MethodDesc".to_string(),
            namespace: Some("clr".to_string()),
            imports: vec![
                ImportEntry {
                    member: "SizeOf".to_string(),
                    module: "engine.dll".to_string(),
                    pattern: Some("40 53 48 83 EC 20".to_string()),
                    offset_guess: -5,
                    whole_module: false,
                    symbol: None,
                    fully_qualified: false,
                    member_name_only: false,
                    ignore_namespace: false,
                },
                ImportEntry {
                    member: "GetMemberDef".to_string(),
                    module: "engine.dll".to_string(),
                    pattern: None,
                    offset_guess: 0,
                    whole_module: false,
                    symbol: None,
                    fully_qualified: false,
                    member_name_only: false,
                    ignore_namespace: true,
                },
            ],
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("methoddesc.imports.json");
        save_imports(&path, &document).unwrap();
        let loaded = load_imports(&path).unwrap();

        let table = loaded.into_table().unwrap();
        assert_eq!(table.scope, "MethodDesc");
        assert_eq!(table.imports.len(), 2);
        match &table.imports[0].resolution {
            Resolution::Pattern { signature, .. } => {
                assert_eq!(signature.len(), 6);
                assert_eq!(signature.offset_guess, -5);
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
        match &table.imports[1].resolution {
            Resolution::Symbol(spec) => assert!(spec.ignore_namespace),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn test_empty_import_document_builds_an_empty_table() {
        let document = ImportDocument {
            scope: "Empty".to_string(),
            namespace: None,
            imports: Vec::new(),
        };
        assert!(document.into_table().unwrap().imports.is_empty());
    }
}
