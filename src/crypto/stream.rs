//! AES-128 in CFB-128 mode over arbitrary readers and writers.

use std::io::{ErrorKind, Read, Write};

use aes::Aes128;
use cfb_mode::cipher::KeyIvInit;
use cfb_mode::{BufDecryptor, BufEncryptor};
use tracing::debug;
use zeroize::Zeroizing;

use super::{BLOCK_LEN, IV_LEN, KEY_LEN};
use crate::error::{CodecError, Result};

/// Default size of a single read from the input (8 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// Trailing padding applied to the plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Padding {
    /// Ciphertext is exactly as long as the plaintext.
    #[default]
    None,
    /// PKCS#5 padding to a whole number of blocks, as written by older
    /// producers of the format.
    Pkcs5,
}

enum Cfb {
    Encrypt(BufEncryptor<Aes128>),
    Decrypt(BufDecryptor<Aes128>),
}

impl Cfb {
    fn new(key: &[u8], iv: &[u8], direction: Direction) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(CodecError::CipherSetup(format!(
                "key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        if iv.len() != IV_LEN {
            return Err(CodecError::CipherSetup(format!(
                "IV must be {IV_LEN} bytes, got {}",
                iv.len()
            )));
        }

        let cipher = match direction {
            Direction::Encrypt => BufEncryptor::<Aes128>::new_from_slices(key, iv).map(Cfb::Encrypt),
            Direction::Decrypt => BufDecryptor::<Aes128>::new_from_slices(key, iv).map(Cfb::Decrypt),
        };
        cipher.map_err(|e| CodecError::CipherSetup(e.to_string()))
    }

    fn apply(&mut self, data: &mut [u8]) {
        match self {
            Cfb::Encrypt(c) => c.encrypt(data),
            Cfb::Decrypt(c) => c.decrypt(data),
        }
    }
}

/// A configured pass of the cipher over one stream.
pub struct Transform {
    cipher: Cfb,
    direction: Direction,
    padding: Padding,
    chunk_size: usize,
}

impl Transform {
    /// Keys the cipher.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CipherSetup`] unless both `key` and `iv` are
    /// 16 bytes long.
    pub fn new(key: &[u8], iv: &[u8], direction: Direction) -> Result<Self> {
        Ok(Self {
            cipher: Cfb::new(key, iv, direction)?,
            direction,
            padding: Padding::None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
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

    /// Streams the rest of `input` through the cipher into `output`.
    ///
    /// Each chunk is written as soon as it is transformed, so on error the
    /// output holds whatever was produced up to that point. Returns the
    /// number of bytes written.
    pub fn run<R, W>(mut self, input: &mut R, output: &mut W) -> Result<u64>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut buf = Zeroizing::new(vec![0u8; self.chunk_size]);

        let written = match (self.direction, self.padding) {
            (_, Padding::None) => self.pump(input, output, &mut buf)?,
            (Direction::Encrypt, Padding::Pkcs5) => self.encrypt_padded(input, output, &mut buf)?,
            (Direction::Decrypt, Padding::Pkcs5) => self.decrypt_padded(input, output, &mut buf)?,
        };

        debug!(
            direction = ?self.direction,
            padding = ?self.padding,
            bytes = written,
            "stream transformed"
        );
        Ok(written)
    }

    fn pump<R, W>(&mut self, input: &mut R, output: &mut W, buf: &mut [u8]) -> Result<u64>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut total = 0u64;
        loop {
            let n = read_chunk(input, buf)?;
            if n == 0 {
                break;
            }
            self.cipher.apply(&mut buf[..n]);
            output.write_all(&buf[..n])?;
            total += n as u64;
        }
        Ok(total)
    }

    fn encrypt_padded<R, W>(&mut self, input: &mut R, output: &mut W, buf: &mut [u8]) -> Result<u64>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let body = self.pump(input, output, buf)?;

        let pad_len = BLOCK_LEN - (body % BLOCK_LEN as u64) as usize;
        let mut pad = [pad_len as u8; BLOCK_LEN];
        self.cipher.apply(&mut pad[..pad_len]);
        output.write_all(&pad[..pad_len])?;

        Ok(body + pad_len as u64)
    }

    /// Decrypts while holding back the last block, which carries the pad.
    fn decrypt_padded<R, W>(&mut self, input: &mut R, output: &mut W, buf: &mut [u8]) -> Result<u64>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut held = Zeroizing::new(Vec::with_capacity(buf.len() + BLOCK_LEN));
        let mut consumed = 0u64;
        let mut written = 0u64;

        loop {
            let n = read_chunk(input, buf)?;
            if n == 0 {
                break;
            }
            self.cipher.apply(&mut buf[..n]);
            held.extend_from_slice(&buf[..n]);
            consumed += n as u64;

            if held.len() > BLOCK_LEN {
                let flush = held.len() - BLOCK_LEN;
                output.write_all(&held[..flush])?;
                held.drain(..flush);
                written += flush as u64;
            }
        }

        if consumed == 0 || consumed % BLOCK_LEN as u64 != 0 {
            return Err(CodecError::InvalidPadding);
        }

        let pad_len = strip_pkcs5(&held)?;
        let keep = held.len() - pad_len;
        output.write_all(&held[..keep])?;

        Ok(written + keep as u64)
    }
}

/// Validates the PKCS#5 pad at the end of a final block and returns its length.
fn strip_pkcs5(block: &[u8]) -> Result<usize> {
    let pad = match block.last() {
        Some(&b) => b as usize,
        None => return Err(CodecError::InvalidPadding),
    };
    if pad == 0 || pad > BLOCK_LEN || pad > block.len() {
        return Err(CodecError::InvalidPadding);
    }
    if !block[block.len() - pad..].iter().all(|&b| b as usize == pad) {
        return Err(CodecError::InvalidPadding);
    }
    Ok(pad)
}

fn read_chunk<R: Read + ?Sized>(input: &mut R, buf: &mut [u8]) -> Result<usize> {
    loop {
        match input.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Runs the unpadded cipher over the rest of `input` with default chunking.
pub fn transform<R, W>(
    input: &mut R,
    output: &mut W,
    key: &[u8],
    iv: &[u8],
    direction: Direction,
) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    Transform::new(key, iv, direction)?.run(input, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    // NIST SP 800-38A, F.3.13 CFB128-AES128.Encrypt, first block
    const NIST_KEY: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f,
        0x3c,
    ];
    const NIST_IV: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f,
    ];
    const NIST_PT: [u8; 16] = [
        0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93, 0x17,
        0x2a,
    ];
    const NIST_CT: [u8; 16] = [
        0x3b, 0x3f, 0xd9, 0x2e, 0xb7, 0x2d, 0xad, 0x20, 0x33, 0x34, 0x49, 0xf8, 0xe8, 0x3c, 0xfb,
        0x4a,
    ];

    const KEY: [u8; 16] = *b"0123456789abcdef";
    const IV: [u8; 16] = [7u8; 16];

    fn run(data: &[u8], direction: Direction, padding: Padding, chunk: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        Transform::new(&KEY, &IV, direction)?
            .with_padding(padding)
            .with_chunk_size(chunk)
            .run(&mut &data[..], &mut out)?;
        Ok(out)
    }

    #[test]
    fn matches_nist_vector() {
        let mut out = Vec::new();
        let n = transform(&mut &NIST_PT[..], &mut out, &NIST_KEY, &NIST_IV, Direction::Encrypt)
            .unwrap();
        assert_eq!(n, 16);
        assert_eq!(out, NIST_CT);

        let mut back = Vec::new();
        transform(&mut &out[..], &mut back, &NIST_KEY, &NIST_IV, Direction::Decrypt).unwrap();
        assert_eq!(back, NIST_PT);
    }

    #[test]
    fn partial_block_is_a_prefix_of_full_block() {
        let mut out = Vec::new();
        transform(&mut &NIST_PT[..5], &mut out, &NIST_KEY, &NIST_IV, Direction::Encrypt).unwrap();
        assert_eq!(out, &NIST_CT[..5]);
    }

    #[test]
    fn chunk_size_does_not_change_output() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 31 % 251) as u8).collect();
        let reference = run(&data, Direction::Encrypt, Padding::None, DEFAULT_CHUNK_SIZE).unwrap();

        for chunk in [1, 3, 15, 16, 17, 100] {
            assert_eq!(
                run(&data, Direction::Encrypt, Padding::None, chunk).unwrap(),
                reference,
                "chunk size {chunk}"
            );
        }
    }

    #[test]
    fn unpadded_roundtrip_preserves_length() {
        for len in [0usize, 1, 15, 16, 17, 33, 4096] {
            let data = vec![0xA5u8; len];
            let ct = run(&data, Direction::Encrypt, Padding::None, 7).unwrap();
            assert_eq!(ct.len(), len);
            let pt = run(&ct, Direction::Decrypt, Padding::None, 5).unwrap();
            assert_eq!(pt, data);
        }
    }

    #[test]
    fn padded_roundtrip() {
        for len in [0usize, 1, 15, 16, 17, 31, 32, 100] {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let ct = run(&data, Direction::Encrypt, Padding::Pkcs5, 4).unwrap();
            assert_eq!(ct.len(), (len / 16 + 1) * 16, "plaintext length {len}");

            for chunk in [1, 16, 64] {
                let pt = run(&ct, Direction::Decrypt, Padding::Pkcs5, chunk).unwrap();
                assert_eq!(pt, data, "plaintext length {len}, chunk {chunk}");
            }
        }
    }

    #[test]
    fn padded_ciphertext_shares_prefix_with_unpadded() {
        let data = b"hello world";
        let plain = run(data, Direction::Encrypt, Padding::None, 64).unwrap();
        let padded = run(data, Direction::Encrypt, Padding::Pkcs5, 64).unwrap();
        assert_eq!(&padded[..plain.len()], &plain[..]);
    }

    #[test]
    fn padded_decrypt_rejects_partial_block() {
        let ct = run(b"hello world", Direction::Encrypt, Padding::Pkcs5, 64).unwrap();
        assert!(matches!(
            run(&ct[..15], Direction::Decrypt, Padding::Pkcs5, 64),
            Err(CodecError::InvalidPadding)
        ));
        assert!(matches!(
            run(&[], Direction::Decrypt, Padding::Pkcs5, 64),
            Err(CodecError::InvalidPadding)
        ));
    }

    #[test]
    fn padded_decrypt_rejects_bad_pad() {
        // a zero pad byte is never valid
        let ct = run(&[0u8; 16], Direction::Encrypt, Padding::None, 64).unwrap();
        assert!(matches!(
            run(&ct, Direction::Decrypt, Padding::Pkcs5, 64),
            Err(CodecError::InvalidPadding)
        ));
    }

    #[test]
    fn strip_pkcs5_checks_every_pad_byte() {
        let mut block = [4u8; 16];
        assert_eq!(strip_pkcs5(&block).unwrap(), 4);

        block[13] = 3;
        assert!(strip_pkcs5(&block).is_err());
        assert!(strip_pkcs5(&[17u8; 16]).is_err());
        assert_eq!(strip_pkcs5(&[16u8; 16]).unwrap(), 16);
    }

    #[test]
    fn wrong_lengths_fail_setup() {
        assert!(matches!(
            Transform::new(&KEY[..15], &IV, Direction::Encrypt),
            Err(CodecError::CipherSetup(_))
        ));
        assert!(matches!(
            Transform::new(&KEY, &[0u8; 12], Direction::Decrypt),
            Err(CodecError::CipherSetup(_))
        ));
    }

    struct Failing;

    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }
    }

    #[test]
    fn read_errors_propagate() {
        let mut out = Vec::new();
        assert!(matches!(
            transform(&mut Failing, &mut out, &KEY, &IV, Direction::Encrypt),
            Err(CodecError::Io(_))
        ));
    }

    struct Interrupting<'a> {
        data: &'a [u8],
        interrupt: bool,
    }

    impl Read for Interrupting<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::from(ErrorKind::Interrupted));
            }
            let n = buf.len().min(self.data.len()).min(4);
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let data = b"interrupted but not lost";
        let mut input = Interrupting {
            data,
            interrupt: false,
        };
        let mut ct = Vec::new();
        transform(&mut input, &mut ct, &KEY, &IV, Direction::Encrypt).unwrap();

        assert_eq!(ct, run(data, Direction::Encrypt, Padding::None, 64).unwrap());
    }
}
