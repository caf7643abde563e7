//! Cryptographic primitives for the encrypted stream.
//!
//! Provides key derivation, IV generation, the key verification header and
//! the AES-128/CFB streaming transform.

pub mod header;
pub mod iv;
pub mod kdf;
pub mod stream;

pub use header::Header;
pub use iv::{IvSource, OsIvSource, RngIvSource};
pub use kdf::{DerivedKey, derive_key};
pub use stream::{DEFAULT_CHUNK_SIZE, Direction, Padding, Transform, transform};

/// Length of the derived AES-128 key (16 bytes).
pub const KEY_LEN: usize = 16;
/// Length of the initialization vector (16 bytes, one AES block).
pub const IV_LEN: usize = 16;
/// Length of the SHA-256 key verification digest (32 bytes).
pub const DIGEST_LEN: usize = 32;
/// AES block size.
pub const BLOCK_LEN: usize = 16;
