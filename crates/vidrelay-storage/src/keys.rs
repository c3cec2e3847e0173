//! Destination key validation shared by every backend.
//!
//! Keys are used exactly as the caller supplies them; nothing is appended or
//! rewritten. They must be non-empty, must not start with `/`, must not contain
//! a `..` segment or a backslash, and must fit the 1024-byte S3 limit.

use crate::traits::{StorageError, StorageResult};

const MAX_KEY_BYTES: usize = 1024;

pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.trim().is_empty() {
        return Err(StorageError::InvalidKey("key is empty".to_string()));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(StorageError::InvalidKey(format!(
            "key is {} bytes, limit is {}",
            key.len(),
            MAX_KEY_BYTES
        )));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(format!(
            "key must be a relative path: {}",
            key
        )));
    }
    if key.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(StorageError::InvalidKey(format!(
            "key contains a relative segment: {}",
            key
        )));
    }
    if key.chars().any(char::is_control) {
        return Err(StorageError::InvalidKey(
            "key contains control characters".to_string(),
        ));
    }
    Ok(())
}
