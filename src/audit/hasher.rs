//! OD-015: BLAKE3 hashes of application definitions.

use crate::core::error::{Error, Result};
use std::io::Read;
use std::path::Path;

const READ_CHUNK: usize = 64 * 1024;

/// Hash text. Returns `"blake3:{hex}"`.
pub fn hash_text(text: &str) -> String {
    format!("blake3:{}", blake3::hash(text.as_bytes()).to_hex())
}

/// Hash a file's contents without loading it whole.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|e| Error::io("open", path, e))?;
    let mut hasher = blake3::Hasher::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut chunk).map_err(|e| Error::io("read", path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

/// First 12 hex digits, for display.
pub fn short(hash: &str) -> &str {
    let hex = hash.strip_prefix("blake3:").unwrap_or(hash);
    &hex[..hex.len().min(12)]
}
