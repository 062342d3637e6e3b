//! Positional wildcard matcher
//!
//! Matching is exact-length and left-to-right; a wildcard position
//! constrains nothing, so no backtracking is ever needed. Both functions
//! are pure: the same buffer and signature always produce the same
//! offsets, in ascending order.

use memchr::memchr_iter;

use super::Signature;

/// Find every offset in `buffer` where `signature` matches.
///
/// Returns an empty vec, never an error, when the buffer is shorter than
/// the signature or either input is empty. Disambiguating multiple
/// matches is the caller's job.
pub fn find_all(buffer: &[u8], signature: &Signature) -> Vec<usize> {
    let pattern = signature.bytes();
    if pattern.is_empty() || buffer.len() < pattern.len() {
        return Vec::new();
    }

    let last = buffer.len() - pattern.len();

    // A literal first byte lets memchr skip the bulk of the buffer.
    if let Some(first) = pattern[0] {
        return memchr_iter(first, &buffer[..=last])
            .filter(|&pos| matches_at(buffer, pos, pattern))
            .collect();
    }

    let mut results = Vec::new();
    'outer: for i in 0..=last {
        for (j, byte) in pattern.iter().enumerate() {
            if let Some(value) = byte {
                if buffer[i + j] != *value {
                    continue 'outer;
                }
            }
        }
        results.push(i);
    }
    results
}

/// First match only; scanning stops at the first hit.
pub fn find_first(buffer: &[u8], signature: &Signature) -> Option<usize> {
    let pattern = signature.bytes();
    if pattern.is_empty() || buffer.len() < pattern.len() {
        return None;
    }

    let last = buffer.len() - pattern.len();

    if let Some(first) = pattern[0] {
        return memchr_iter(first, &buffer[..=last]).find(|&pos| matches_at(buffer, pos, pattern));
    }

    (0..=last).find(|&pos| matches_at(buffer, pos, pattern))
}

fn matches_at(buffer: &[u8], pos: usize, pattern: &[Option<u8>]) -> bool {
    pattern.iter().enumerate().all(|(j, byte)| match byte {
        Some(value) => buffer[pos + j] == *value,
        None => true,
    })
}
