use getrandom::fill;
use rand::RngCore;

use super::IV_LEN;
use crate::error::{CodecError, Result};

/// A source of initialization vectors.
///
/// Every encode draws a fresh IV from the source it was given, so tests can
/// swap the OS generator for a seeded one.
pub trait IvSource {
    fn fill_iv(&mut self, iv: &mut [u8; IV_LEN]) -> Result<()>;
}

impl<T: IvSource + ?Sized> IvSource for &mut T {
    fn fill_iv(&mut self, iv: &mut [u8; IV_LEN]) -> Result<()> {
        (**self).fill_iv(iv)
    }
}

/// IVs from the operating system's secure random generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsIvSource;

impl IvSource for OsIvSource {
    fn fill_iv(&mut self, iv: &mut [u8; IV_LEN]) -> Result<()> {
        fill(iv).map_err(|_| CodecError::Random)
    }
}

/// IVs from any [`RngCore`], e.g. a seeded `StdRng` for reproducible output.
#[derive(Debug, Clone)]
pub struct RngIvSource<R>(R);

impl<R: RngCore> RngIvSource<R> {
    pub fn new(rng: R) -> Self {
        Self(rng)
    }

    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<R: RngCore> IvSource for RngIvSource<R> {
    fn fill_iv(&mut self, iv: &mut [u8; IV_LEN]) -> Result<()> {
        self.0.try_fill_bytes(iv).map_err(|_| CodecError::Random)
    }
}

/// Draw one IV from `source`.
pub fn generate_iv<S: IvSource + ?Sized>(source: &mut S) -> Result<[u8; IV_LEN]> {
    let mut iv = [0u8; IV_LEN];
    source.fill_iv(&mut iv)?;
    Ok(iv)
}
