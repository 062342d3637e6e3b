mod matcher;
mod signature;

pub use matcher::{find_all, find_first};
pub use signature::{
    Signature, SignatureEntry, SignatureSet, format_pattern, load_signatures, parse_pattern,
    save_signatures,
};
