//! Layout of an encrypted stream.
//!
//! ```text
//! SHA256(KEY) (32) | IV (16) | CIPHERTEXT
//! ```
//!
//! There is no magic number and no version byte. The ciphertext is as long
//! as the plaintext, or up to 16 bytes longer in legacy padded mode.

use std::io::{self, ErrorKind, Read};

use crate::crypto::{DIGEST_LEN, IV_LEN};
use crate::error::{CodecError, Result};

/// Total header length.
pub const HEADER_LEN: usize = DIGEST_LEN + IV_LEN;

/// Header fields as stored, read without a passphrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInfo {
    digest: [u8; DIGEST_LEN],
    iv: [u8; IV_LEN],
}

impl HeaderInfo {
    /// Stored SHA-256 of the derived key.
    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }
}

/// Reads the header of an encrypted stream without checking any key.
///
/// # Errors
///
/// Returns [`CodecError::TruncatedHeader`] or [`CodecError::TruncatedIv`] if
/// the stream is shorter than [`HEADER_LEN`].
pub fn inspect<R: Read>(mut source: R) -> Result<HeaderInfo> {
    let mut digest = [0u8; DIGEST_LEN];
    if read_full(&mut source, &mut digest)? != DIGEST_LEN {
        return Err(CodecError::TruncatedHeader);
    }

    let mut iv = [0u8; IV_LEN];
    if read_full(&mut source, &mut iv)? != IV_LEN {
        return Err(CodecError::TruncatedIv);
    }

    Ok(HeaderInfo { digest, iv })
}

/// Fills `buf` from `reader` until it is full or the reader hits EOF.
///
/// Returns how many bytes were read; less than `buf.len()` only at EOF.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
