//! Passphrase-based streaming file encryption.
//!
//! An encrypted stream is `sha256(key) || iv || ciphertext`, where the key is
//! the first 16 bytes of the passphrase and the payload is AES-128 in CFB
//! mode. The digest lets [`decode`] reject a wrong passphrase before any
//! plaintext is produced. It does not protect the ciphertext against
//! tampering.
//!
//! ```no_run
//! # fn main() -> streamcrypt::Result<()> {
//! let mut encrypted = Vec::new();
//! streamcrypt::encode(&b"hello world"[..], &mut encrypted, "0123456789abcdef")?;
//! assert_eq!(encrypted.len(), 48 + 11);
//!
//! let mut plaintext = Vec::new();
//! streamcrypt::decode(&encrypted[..], &mut plaintext, "0123456789abcdef")?;
//! assert_eq!(plaintext, b"hello world");
//! # Ok(())
//! # }
//! ```

pub mod crypto;
mod error;
pub mod format;
mod storage;

use std::io::{Read, Write};

use tracing::debug;

pub use crate::crypto::{DEFAULT_CHUNK_SIZE, Direction, IvSource, OsIvSource, Padding, RngIvSource};
pub use crate::error::{CodecError, Result};
pub use crate::format::{HEADER_LEN, HeaderInfo, inspect};
pub use crate::storage::OutputFile;
use crate::crypto::{Header, Transform, derive_key};

/// Encoder/decoder for the encrypted stream format.
///
/// The default codec draws IVs from the OS, writes no padding and reads
/// 8 KiB at a time. A codec holds no key material and can be reused.
#[derive(Debug, Clone)]
pub struct StreamCodec<S = OsIvSource> {
    iv_source: S,
    padding: Padding,
    chunk_size: usize,
}

impl StreamCodec<OsIvSource> {
    pub fn new() -> Self {
        Self {
            iv_source: OsIvSource,
            padding: Padding::None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Default for StreamCodec<OsIvSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: IvSource> StreamCodec<S> {
    /// Replaces the IV source, e.g. with a seeded [`RngIvSource`] in tests.
    pub fn with_iv_source<T: IvSource>(self, iv_source: T) -> StreamCodec<T> {
        StreamCodec {
            iv_source,
            padding: self.padding,
            chunk_size: self.chunk_size,
        }
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    /// Sets the maximum size of a single read. Zero is treated as one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Encrypts everything `source` yields into `sink`.
    ///
    /// Writes the 48-byte header followed by the ciphertext and returns the
    /// ciphertext length. A short passphrase is rejected before anything is
    /// read or written. On any other error `sink` may hold partial output,
    /// which the caller must discard.
    pub fn encode<R: Read, W: Write>(
        &mut self,
        mut source: R,
        mut sink: W,
        passphrase: &str,
    ) -> Result<u64> {
        let key = derive_key(passphrase)?;
        let header = Header::new(&key, &mut self.iv_source)?;
        header.write(&mut sink)?;
        debug!("header written");

        let written = Transform::new(key.as_bytes(), header.iv(), Direction::Encrypt)?
            .with_padding(self.padding)
            .with_chunk_size(self.chunk_size)
            .run(&mut source, &mut sink)?;
        sink.flush()?;

        Ok(written)
    }

    /// Verifies the header against `passphrase` and decrypts the rest of
    /// `source` into `sink`.
    ///
    /// Returns the plaintext length. Nothing is written to `sink` unless the
    /// passphrase matches.
    pub fn decode<R: Read, W: Write>(&self, mut source: R, mut sink: W, passphrase: &str) -> Result<u64> {
        let key = derive_key(passphrase)?;
        let header = Header::read(&mut source, &key)?;
        debug!("header verified");

        let written = Transform::new(key.as_bytes(), header.iv(), Direction::Decrypt)?
            .with_padding(self.padding)
            .with_chunk_size(self.chunk_size)
            .run(&mut source, &mut sink)?;
        sink.flush()?;

        Ok(written)
    }
}

/// Encrypts `source` into `sink` with a fresh random IV.
pub fn encode<R: Read, W: Write>(source: R, sink: W, passphrase: &str) -> Result<()> {
    StreamCodec::new().encode(source, sink, passphrase)?;
    Ok(())
}

/// Decrypts a stream produced by [`encode`].
pub fn decode<R: Read, W: Write>(source: R, sink: W, passphrase: &str) -> Result<()> {
    StreamCodec::new().decode(source, sink, passphrase)?;
    Ok(())
}

/// Checks `passphrase` against the header of `source` without decrypting.
pub fn verify<R: Read>(mut source: R, passphrase: &str) -> Result<()> {
    let key = derive_key(passphrase)?;
    Header::read(&mut source, &key)?;
    Ok(())
}
