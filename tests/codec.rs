use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use streamcrypt::{CodecError, HEADER_LEN, Padding, RngIvSource, StreamCodec, decode, encode};
use tempfile::tempdir;

const PASSWORD: &str = "123456789qwertyui";

#[test]
fn file_roundtrip_through_handles() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("lion.jpg");
    let encrypted = dir.path().join("lion-enc.jpg");
    let decrypted = dir.path().join("lion-dec.jpg");

    let data: Vec<u8> = (0..100_000u32).map(|i| (i.wrapping_mul(2654435761) >> 24) as u8).collect();
    fs::write(&source, &data).unwrap();

    encode(
        File::open(&source).unwrap(),
        File::create(&encrypted).unwrap(),
        PASSWORD,
    )
    .unwrap();
    decode(
        File::open(&encrypted).unwrap(),
        File::create(&decrypted).unwrap(),
        PASSWORD,
    )
    .unwrap();

    assert_eq!(
        fs::metadata(&encrypted).unwrap().len(),
        (HEADER_LEN + data.len()) as u64
    );
    assert_eq!(fs::read(&decrypted).unwrap(), data);
}

#[test]
fn unicode_passphrase_roundtrip() {
    // 16 bytes, 7 characters
    let password = "пароль🔑";
    assert_eq!(password.len(), 16);

    let mut encrypted = Vec::new();
    encode(&b"unicode"[..], &mut encrypted, password).unwrap();

    let mut decrypted = Vec::new();
    decode(&encrypted[..], &mut decrypted, password).unwrap();
    assert_eq!(decrypted, b"unicode");
}

#[test]
fn passphrases_sharing_a_split_character_prefix_match() {
    // both cut the final character at byte 16, leaving the same first byte
    let a = "aaaaaaaaaaaaaaa€";
    let b = "aaaaaaaaaaaaaaa₤";
    assert_eq!(a.as_bytes()[..16], b.as_bytes()[..16]);

    let mut encrypted = Vec::new();
    encode(&b"split"[..], &mut encrypted, a).unwrap();

    let mut decrypted = Vec::new();
    decode(&encrypted[..], &mut decrypted, b).unwrap();
    assert_eq!(decrypted, b"split");
}

#[test]
fn flipped_ciphertext_byte_is_not_detected() {
    let mut encrypted = Vec::new();
    encode(&b"hello world"[..], &mut encrypted, PASSWORD).unwrap();
    encrypted[HEADER_LEN] ^= 0x01;

    let mut decrypted = Vec::new();
    decode(&encrypted[..], &mut decrypted, PASSWORD).unwrap();
    assert_eq!(decrypted.len(), 11);
    assert_eq!(decrypted[0], b'h' ^ 0x01);
}

#[test]
fn flipped_digest_byte_is_a_key_mismatch() {
    let mut encrypted = Vec::new();
    encode(&b"hello world"[..], &mut encrypted, PASSWORD).unwrap();
    encrypted[0] ^= 0x80;

    let mut decrypted = Vec::new();
    assert!(matches!(
        decode(&encrypted[..], &mut decrypted, PASSWORD),
        Err(CodecError::KeyMismatch)
    ));
}

#[test]
fn seeded_encodes_match_byte_for_byte() {
    let encode_with_seed = |seed| {
        let mut codec = StreamCodec::new()
            .with_iv_source(RngIvSource::new(StdRng::seed_from_u64(seed)))
            .with_chunk_size(13);
        let mut out = Vec::new();
        codec.encode(&b"deterministic output"[..], &mut out, PASSWORD).unwrap();
        out
    };

    assert_eq!(encode_with_seed(1), encode_with_seed(1));
    assert_ne!(encode_with_seed(1), encode_with_seed(2));
}

#[test]
fn legacy_padded_file_roundtrip() {
    let mut codec = StreamCodec::new().with_padding(Padding::Pkcs5);

    for len in [0usize, 15, 16, 1000] {
        let data = vec![0x5Au8; len];
        let mut encrypted = Vec::new();
        codec.encode(&data[..], &mut encrypted, PASSWORD).unwrap();
        assert_eq!(encrypted.len(), HEADER_LEN + (len / 16 + 1) * 16);

        let mut decrypted = Vec::new();
        codec.decode(&encrypted[..], &mut decrypted, PASSWORD).unwrap();
        assert_eq!(decrypted, data);
    }
}

struct BrokenSink;

impl Write for BrokenSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn sink_errors_surface_as_io() {
    match encode(&b"data"[..], BrokenSink, PASSWORD) {
        Err(CodecError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("expected Io, got: {other:?}"),
    }
}

/// Fails after yielding `limit` bytes.
struct FailAfter<'a> {
    data: &'a [u8],
    limit: usize,
}

impl Read for FailAfter<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.limit == 0 {
            return Err(io::Error::other("read failed"));
        }
        let n = buf.len().min(self.limit).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        self.limit -= n;
        Ok(n)
    }
}

#[test]
fn mid_stream_read_error_leaves_partial_output() {
    let data = vec![1u8; 64];
    let source = FailAfter {
        data: &data,
        limit: 20,
    };

    let mut out = Vec::new();
    assert!(matches!(
        encode(source, &mut out, PASSWORD),
        Err(CodecError::Io(_))
    ));
    assert_eq!(out.len(), HEADER_LEN + 20);
}
