//! Collision-resistant class name suffixes.
//!
//! The suffix is derived from the style snippet's text via SHA-256, so the
//! same input always produces the same class name. That determinism is what
//! lets hosts cache compile output by content.

use sha2::{Digest, Sha256};

/// Length of the generated suffix.
pub const SUFFIX_LEN: usize = 10;

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Derive a deterministic alphanumeric suffix from `seed`.
pub fn class_suffix(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    digest
        .iter()
        .take(SUFFIX_LEN)
        .map(|b| CHARSET[*b as usize % CHARSET.len()] as char)
        .collect()
}

/// Combine a class name with its derived suffix: `btn` -> `btn_XXXXXXXXXX`.
pub fn unique_name(prefix: &str, seed: &str) -> String {
    format!("{prefix}_{}", class_suffix(seed))
}
