use thiserror::Error;

/// Errors produced while encoding or decoding an encrypted stream.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The passphrase is shorter than the key it must provide.
    #[error("passphrase must be at least {min} bytes long, got {actual}")]
    InvalidKey { min: usize, actual: usize },

    /// The input ended before the key digest was complete.
    #[error("encrypted stream is truncated: key digest incomplete")]
    TruncatedHeader,

    /// The input ended before the IV was complete.
    #[error("encrypted stream is truncated: IV incomplete")]
    TruncatedIv,

    /// The stored key digest does not match the supplied passphrase.
    #[error("Invalid password: key digest does not match")]
    KeyMismatch,

    /// The cipher could not be keyed.
    #[error("cipher setup failed: {0}")]
    CipherSetup(String),

    /// The trailing PKCS#5 padding of a legacy stream is malformed.
    #[error("invalid padding at end of encrypted stream")]
    InvalidPadding,

    /// The IV source failed to produce random bytes.
    #[error("random generator unavailable")]
    Random,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;
