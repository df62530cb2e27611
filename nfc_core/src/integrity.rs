//! SHA-256 envelope over the original, pre-transform payload.

use sha2::{Digest, Sha256};

use crate::error::{FormatError, Result};

/// Length of the trailing digest in bytes.
pub const DIGEST_LEN: usize = 32;

pub fn digest(payload: &[u8]) -> [u8; DIGEST_LEN] {
    Sha256::digest(payload).into()
}

/// Recomputes the digest of `recovered` and compares it with `stored`.
pub fn verify(recovered: &[u8], stored: &[u8]) -> Result<()> {
    let actual = digest(recovered);
    if stored != actual.as_slice() {
        return Err(FormatError::IntegrityFailure {
            expected: hex(stored),
            actual: hex(&actual),
        });
    }
    Ok(())
}

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
