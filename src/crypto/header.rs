use std::io::{Read, Write};

use subtle::ConstantTimeEq;
use tracing::debug;

use super::iv::{IvSource, generate_iv};
use super::{DIGEST_LEN, DerivedKey, IV_LEN};
use crate::error::{CodecError, Result};
use crate::format::{HEADER_LEN, read_full};

/// The key verification header: `sha256(key) || iv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    digest: [u8; DIGEST_LEN],
    iv: [u8; IV_LEN],
}

impl Header {
    pub const LEN: usize = HEADER_LEN;

    /// Builds a header for `key` with a fresh IV drawn from `source`.
    pub fn new<S: IvSource + ?Sized>(key: &DerivedKey, source: &mut S) -> Result<Self> {
        Ok(Self {
            digest: key.digest(),
            iv: generate_iv(source)?,
        })
    }

    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..DIGEST_LEN].copy_from_slice(&self.digest);
        buf[DIGEST_LEN..].copy_from_slice(&self.iv);
        buf
    }

    /// Writes exactly [`Header::LEN`] bytes.
    pub fn write<W: Write + ?Sized>(&self, output: &mut W) -> Result<()> {
        output.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Reads the header and checks it against `key`.
    ///
    /// Consumes exactly [`Header::LEN`] bytes on success. The digest is
    /// checked before the IV is read, so a wrong passphrase is reported even
    /// if the IV is missing.
    ///
    /// # Errors
    ///
    /// - [`CodecError::TruncatedHeader`] if fewer than 32 bytes are available
    /// - [`CodecError::KeyMismatch`] if the digest does not match `key`
    /// - [`CodecError::TruncatedIv`] if the IV is incomplete
    pub fn read<R: Read + ?Sized>(input: &mut R, key: &DerivedKey) -> Result<Self> {
        let mut digest = [0u8; DIGEST_LEN];
        if read_full(input, &mut digest)? != DIGEST_LEN {
            return Err(CodecError::TruncatedHeader);
        }

        let expected = key.digest();
        if !bool::from(expected[..].ct_eq(&digest[..])) {
            debug!("key digest mismatch");
            return Err(CodecError::KeyMismatch);
        }

        let mut iv = [0u8; IV_LEN];
        if read_full(input, &mut iv)? != IV_LEN {
            return Err(CodecError::TruncatedIv);
        }

        Ok(Self { digest, iv })
    }
}
