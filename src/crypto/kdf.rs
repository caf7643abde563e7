use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{DIGEST_LEN, KEY_LEN};
use crate::error::{CodecError, Result};

/// The 16-byte AES key taken from a passphrase.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// SHA-256 of the key, stored in the stream header.
    pub fn digest(&self) -> [u8; DIGEST_LEN] {
        Sha256::digest(self.0).into()
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// Derive the cipher key from a passphrase.
///
/// The key is the first 16 bytes of the UTF-8 encoding. Slicing happens at
/// the byte level, so a multi-byte character straddling the boundary is cut
/// in half. Files produced by other implementations of the format depend on
/// this.
///
/// # Errors
///
/// Returns [`CodecError::InvalidKey`] if the passphrase encodes to fewer
/// than 16 bytes.
pub fn derive_key(passphrase: &str) -> Result<DerivedKey> {
    let bytes = passphrase.as_bytes();
    if bytes.len() < KEY_LEN {
        return Err(CodecError::InvalidKey {
            min: KEY_LEN,
            actual: bytes.len(),
        });
    }

    let mut key = DerivedKey([0u8; KEY_LEN]);
    key.0.copy_from_slice(&bytes[..KEY_LEN]);
    Ok(key)
}
