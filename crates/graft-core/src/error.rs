use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Module not loaded: {0}")]
    ModuleNotLoaded(String),

    #[error("Segment {segment} not found in module {module}")]
    SegmentNotFound { module: String, segment: String },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Pattern {pattern} not found in {module}")]
    PatternNotFound { module: String, pattern: String },

    #[error("Pattern {pattern} matched {count} locations in {module}")]
    AmbiguousPattern {
        module: String,
        pattern: String,
        count: usize,
    },

    #[error("Resolved address {address:#x} is outside module {module}")]
    AddressOutOfModule { module: String, address: u64 },

    #[error("Symbol store unavailable for {module}: {message}")]
    SymbolStoreUnavailable { module: String, message: String },

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Unsupported layout: {0}")]
    UnsupportedLayout(String),

    #[error("Illegal patch target: {0}")]
    IllegalPatchTarget(String),

    #[error("Failed to change protection at {address:#x}: {message}")]
    ProtectionChangeFailed { address: u64, message: String },

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Engine routine {0} is not bound")]
    RoutineNotBound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error means the import simply did not resolve,
    /// as opposed to state corruption or an OS-level failure.
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            Error::PatternNotFound { .. }
                | Error::SymbolNotFound(_)
                | Error::AmbiguousPattern { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_unresolved() {
        let err = Error::PatternNotFound {
            module: "engine.dll".to_string(),
            pattern: "DE AD".to_string(),
        };
        assert!(err.is_unresolved());

        let err2 = Error::ProtectionChangeFailed {
            address: 0x1000,
            message: "denied".to_string(),
        };
        assert!(!err2.is_unresolved());
    }
}
