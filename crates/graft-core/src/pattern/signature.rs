use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// A byte pattern with wildcard positions, plus the displacement applied
/// to a match to reach the true target address.
///
/// The text form is space-separated hex pairs with `??` (or `?`) for
/// wildcard bytes: `"48 8B ?? 05"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    bytes: Vec<Option<u8>>,
    pub offset_guess: i64,
}

impl Signature {
    pub fn parse(pattern: &str) -> Result<Self> {
        Ok(Self {
            bytes: parse_pattern(pattern)?,
            offset_guess: 0,
        })
    }

    pub fn with_offset_guess(mut self, offset_guess: i64) -> Self {
        self.offset_guess = offset_guess;
        self
    }

    pub fn bytes(&self) -> &[Option<u8>] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Signature matching an exact literal byte sequence.
    pub fn from_literal(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.iter().copied().map(Some).collect(),
            offset_guess: 0,
        }
    }

    pub fn to_pattern_string(&self) -> String {
        format_pattern(&self.bytes)
    }
}

/// One named signature in a signature-set document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub offset_guess: i64,
}

impl SignatureEntry {
    pub fn signature(&self) -> Result<Signature> {
        Ok(Signature::parse(&self.pattern)?.with_offset_guess(self.offset_guess))
    }
}

/// On-disk signature collection, keyed by engine build version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureSet {
    pub version: String,
    pub entries: Vec<SignatureEntry>,
}

impl SignatureSet {
    pub fn entry(&self, name: &str) -> Option<&SignatureEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }
}

pub fn load_signatures<P: AsRef<Path>>(path: P) -> Result<SignatureSet> {
    let content = fs::read_to_string(&path)?;
    let data = serde_json::from_str(&content)?;
    Ok(data)
}

pub fn save_signatures<P: AsRef<Path>>(path: P, signatures: &SignatureSet) -> Result<()> {
    let content = serde_json::to_string_pretty(signatures)?;
    fs::write(path, content)?;
    Ok(())
}

pub fn parse_pattern(pattern: &str) -> Result<Vec<Option<u8>>> {
    let mut bytes = Vec::new();
    for token in pattern.split_whitespace() {
        if token == "??" || token == "?" {
            bytes.push(None);
            continue;
        }

        let value = u8::from_str_radix(token, 16).map_err(|e| {
            Error::InvalidSignature(format!("Invalid signature token '{}': {}", token, e))
        })?;
        bytes.push(Some(value));
    }

    if bytes.is_empty() {
        return Err(Error::InvalidSignature(
            "Signature pattern is empty".to_string(),
        ));
    }

    Ok(bytes)
}

pub fn format_pattern(bytes: &[Option<u8>]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            Some(value) => format!("{:02X}", value),
            None => "??".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
