//! Module scanning: pattern search over a loaded module's bytes
//!
//! A [`ModuleProvider`] hands out snapshots of a module (or one of its
//! segments); [`ModuleScanner`] runs the wildcard matcher over a snapshot
//! and translates buffer-relative hits into absolute process addresses.

#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "windows")]
pub use windows::LoadedModuleProvider;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::pattern::{self, Signature};

/// Conventional name of the executable-code segment.
pub const TEXT_SEGMENT: &str = ".text";

#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub base: u64,
    pub size: u64,
}

impl ModuleInfo {
    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.base + self.size
    }
}

/// Bytes of one module segment, captured at snapshot time.
#[derive(Debug, Clone)]
pub struct SegmentSnapshot {
    pub module: ModuleInfo,
    /// `None` when the snapshot covers the whole mapped module.
    pub segment: Option<String>,
    /// Absolute address of `bytes[0]`.
    pub base: u64,
    pub bytes: Vec<u8>,
}

/// External collaborator that enumerates loaded modules and reads their
/// mapped bytes. The returned bytes are assumed to be a faithful snapshot.
pub trait ModuleProvider {
    fn modules(&self) -> Result<Vec<ModuleInfo>>;

    fn module(&self, name: &str) -> Result<ModuleInfo> {
        self.modules()?
            .into_iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::ModuleNotLoaded(name.to_string()))
    }

    fn snapshot_module(&self, name: &str) -> Result<SegmentSnapshot>;

    fn snapshot_segment(&self, name: &str, segment: &str) -> Result<SegmentSnapshot>;
}

impl<T: ModuleProvider + ?Sized> ModuleProvider for &T {
    fn modules(&self) -> Result<Vec<ModuleInfo>> {
        (**self).modules()
    }

    fn snapshot_module(&self, name: &str) -> Result<SegmentSnapshot> {
        (**self).snapshot_module(name)
    }

    fn snapshot_segment(&self, name: &str, segment: &str) -> Result<SegmentSnapshot> {
        (**self).snapshot_segment(name, segment)
    }
}

/// Policy for a pattern that matches more than once with no offset guess
/// to pick one out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchSelection {
    /// Accept the first (lowest-address) match. Multiplicity is logged,
    /// not reported as an error.
    #[default]
    FirstMatch,
    /// Surface [`Error::AmbiguousPattern`] instead.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Pattern,
    Symbol,
}

/// An absolute address produced by scanning or symbol lookup.
///
/// Always lies within the mapped range of the named module; resolution
/// fails rather than produce an out-of-module address.
#[derive(Debug, Clone)]
pub struct ResolvedAddress {
    pub address: u64,
    pub module: String,
    pub provenance: Provenance,
}

pub struct ModuleScanner<'a, P: ModuleProvider> {
    provider: &'a P,
    selection: MatchSelection,
    snapshot: Option<SegmentSnapshot>,
}

impl<'a, P: ModuleProvider> ModuleScanner<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self {
            provider,
            selection: MatchSelection::default(),
            snapshot: None,
        }
    }

    pub fn with_selection(mut self, selection: MatchSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Snapshot a whole module for scanning.
    pub fn select_module(&mut self, name: &str) -> Result<()> {
        let snapshot = self.provider.snapshot_module(name)?;
        debug!(
            "Selected module {} ({:#x}, {} bytes)",
            snapshot.module.name,
            snapshot.base,
            snapshot.bytes.len()
        );
        self.snapshot = Some(snapshot);
        Ok(())
    }

    /// Snapshot a single segment, typically [`TEXT_SEGMENT`], which cuts
    /// both false positives and scan cost.
    pub fn select_module_segment(&mut self, name: &str, segment: &str) -> Result<()> {
        let snapshot = self.provider.snapshot_segment(name, segment)?;
        debug!(
            "Selected segment {} of {} ({:#x}, {} bytes)",
            segment,
            snapshot.module.name,
            snapshot.base,
            snapshot.bytes.len()
        );
        self.snapshot = Some(snapshot);
        Ok(())
    }

    pub fn base_address(&self) -> Option<u64> {
        self.snapshot.as_ref().map(|s| s.module.base)
    }

    pub fn selected_module(&self) -> Option<&ModuleInfo> {
        self.snapshot.as_ref().map(|s| &s.module)
    }

    /// Scan the selected snapshot for `signature`, using its own offset
    /// guess.
    pub fn find_pattern(&self, signature: &Signature) -> Result<ResolvedAddress> {
        self.find_pattern_with_guess(signature, signature.offset_guess)
    }

    /// Scan with an explicit offset guess, overriding the signature's.
    ///
    /// The returned address is exactly `match_address + offset_guess`. A
    /// non-zero guess also serves to disambiguate: when the caller knows
    /// the displacement, the first match plus the guess is the intended
    /// target by construction.
    pub fn find_pattern_with_guess(
        &self,
        signature: &Signature,
        offset_guess: i64,
    ) -> Result<ResolvedAddress> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or_else(|| Error::ModuleNotLoaded("no module selected".to_string()))?;

        let matches = pattern::find_all(&snapshot.bytes, signature);
        debug!(
            "Pattern {} in {}: {} match(es)",
            signature.to_pattern_string(),
            snapshot.module.name,
            matches.len()
        );

        let first = match matches.as_slice() {
            [] => {
                return Err(Error::PatternNotFound {
                    module: snapshot.module.name.clone(),
                    pattern: signature.to_pattern_string(),
                });
            }
            [only] => *only,
            [first, ..] => {
                if offset_guess == 0 && self.selection == MatchSelection::Fail {
                    return Err(Error::AmbiguousPattern {
                        module: snapshot.module.name.clone(),
                        pattern: signature.to_pattern_string(),
                        count: matches.len(),
                    });
                }
                warn!(
                    "Pattern {} matched {} locations in {}; taking first at {:#x}",
                    signature.to_pattern_string(),
                    matches.len(),
                    snapshot.module.name,
                    snapshot.base + *first as u64
                );
                *first
            }
        };

        let address = (snapshot.base + first as u64).wrapping_add_signed(offset_guess);
        if !snapshot.module.contains(address) {
            return Err(Error::AddressOutOfModule {
                module: snapshot.module.name.clone(),
                address,
            });
        }

        Ok(ResolvedAddress {
            address,
            module: snapshot.module.name.clone(),
            provenance: Provenance::Pattern,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockModuleProvider;
    use super::*;

    fn provider_with_segment() -> MockModuleProvider {
        // 0x1000-byte code segment based at 0x2000 with DE AD BE EF at
        // offset 0x100.
        let mut bytes = vec![0u8; 0x1000];
        bytes[0x100..0x104].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let mut provider = MockModuleProvider::new();
        provider.add_module("engine.dll", 0x2000, 0x1000, &bytes);
        provider.add_segment("engine.dll", TEXT_SEGMENT, 0x2000, &bytes);
        provider
    }

    #[test]
    fn test_find_pattern_translates_to_absolute_address() {
        let provider = provider_with_segment();
        let mut scanner = ModuleScanner::new(&provider);
        scanner
            .select_module_segment("engine.dll", TEXT_SEGMENT)
            .unwrap();

        let signature = Signature::parse("DE AD BE EF").unwrap();
        let resolved = scanner.find_pattern_with_guess(&signature, 0).unwrap();
        assert_eq!(resolved.address, 0x2100);
        assert_eq!(resolved.module, "engine.dll");
        assert_eq!(resolved.provenance, Provenance::Pattern);
    }

    #[test]
    fn test_offset_guess_is_added_exactly() {
        let provider = provider_with_segment();
        let mut scanner = ModuleScanner::new(&provider);
        scanner
            .select_module_segment("engine.dll", TEXT_SEGMENT)
            .unwrap();

        let signature = Signature::parse("DE AD BE EF").unwrap();
        let resolved = scanner.find_pattern_with_guess(&signature, 4).unwrap();
        assert_eq!(resolved.address, 0x2104);

        let back = scanner.find_pattern_with_guess(&signature, -0x10).unwrap();
        assert_eq!(back.address, 0x20F0);
    }

    #[test]
    fn test_signature_carries_its_own_guess() {
        let provider = provider_with_segment();
        let mut scanner = ModuleScanner::new(&provider);
        scanner.select_module("engine.dll").unwrap();

        let signature = Signature::parse("DE AD BE EF")
            .unwrap()
            .with_offset_guess(8);
        assert_eq!(scanner.find_pattern(&signature).unwrap().address, 0x2108);
    }

    #[test]
    fn test_zero_matches_is_pattern_not_found() {
        let provider = provider_with_segment();
        let mut scanner = ModuleScanner::new(&provider);
        scanner.select_module("engine.dll").unwrap();

        let signature = Signature::parse("01 02 03 04 05").unwrap();
        let err = scanner.find_pattern(&signature).unwrap_err();
        assert!(matches!(err, Error::PatternNotFound { .. }));
    }

    #[test]
    fn test_multiple_matches_first_wins_by_default() {
        let mut bytes = vec![0u8; 0x100];
        bytes[0x10..0x12].copy_from_slice(&[0xCA, 0xFE]);
        bytes[0x80..0x82].copy_from_slice(&[0xCA, 0xFE]);
        let mut provider = MockModuleProvider::new();
        provider.add_module("engine.dll", 0x4000, 0x100, &bytes);

        let mut scanner = ModuleScanner::new(&provider);
        scanner.select_module("engine.dll").unwrap();
        let signature = Signature::parse("CA FE").unwrap();
        assert_eq!(scanner.find_pattern(&signature).unwrap().address, 0x4010);
    }

    #[test]
    fn test_multiple_matches_fail_policy() {
        let mut bytes = vec![0u8; 0x100];
        bytes[0x10..0x12].copy_from_slice(&[0xCA, 0xFE]);
        bytes[0x80..0x82].copy_from_slice(&[0xCA, 0xFE]);
        let mut provider = MockModuleProvider::new();
        provider.add_module("engine.dll", 0x4000, 0x100, &bytes);

        let mut scanner = ModuleScanner::new(&provider).with_selection(MatchSelection::Fail);
        scanner.select_module("engine.dll").unwrap();
        let signature = Signature::parse("CA FE").unwrap();
        let err = scanner.find_pattern(&signature).unwrap_err();
        assert!(matches!(err, Error::AmbiguousPattern { count: 2, .. }));

        // A non-zero guess names a specific match, so the policy does not
        // trigger.
        assert!(scanner.find_pattern_with_guess(&signature, 2).is_ok());
    }

    #[test]
    fn test_guess_outside_module_is_rejected() {
        let provider = provider_with_segment();
        let mut scanner = ModuleScanner::new(&provider);
        scanner.select_module("engine.dll").unwrap();

        let signature = Signature::parse("DE AD BE EF").unwrap();
        let err = scanner
            .find_pattern_with_guess(&signature, 0x10_0000)
            .unwrap_err();
        assert!(matches!(err, Error::AddressOutOfModule { .. }));
    }

    #[test]
    fn test_unknown_module_fails_before_scanning() {
        let provider = provider_with_segment();
        let mut scanner = ModuleScanner::new(&provider);
        let err = scanner.select_module("missing.dll").unwrap_err();
        assert!(matches!(err, Error::ModuleNotLoaded(_)));
    }

    #[test]
    fn test_unknown_segment() {
        let provider = provider_with_segment();
        let mut scanner = ModuleScanner::new(&provider);
        let err = scanner
            .select_module_segment("engine.dll", ".data")
            .unwrap_err();
        assert!(matches!(err, Error::SegmentNotFound { .. }));
    }
}
