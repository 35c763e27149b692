#[cfg(feature = "std")]
pub mod std;
#[cfg(feature = "std")]
pub use self::std::FileIO;

use alloc::vec::Vec;
use core::convert::Infallible;
use core::fmt::Debug;
use core::ops::DerefMut;

use crate::error::Error;

/// Byte source backing a container.
///
/// Reads are positional. Writes are never issued piecemeal, `commit` receives
/// the complete new image and must replace the old content as a whole, so that
/// a failed commit leaves the previous bytes untouched.
pub trait IO {
    type Error: Debug;

    fn len(&mut self) -> Result<u64, Self::Error>;
    /// Fills `buf` from `offset`, returns fewer bytes only at end of data
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, Self::Error>;
    fn commit(&mut self, image: &[u8]) -> Result<(), Self::Error>;
}

/// In-memory container bytes
#[derive(Clone, Debug, Default)]
pub struct MemoryIO(Vec<u8>);

impl MemoryIO {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for MemoryIO {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl IO for MemoryIO {
    type Error = Infallible;

    fn len(&mut self) -> Result<u64, Infallible> {
        Ok(self.0.len() as u64)
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, Infallible> {
        let start = core::cmp::min(offset, self.0.len() as u64) as usize;
        let length = core::cmp::min(buf.len(), self.0.len() - start);
        buf[..length].copy_from_slice(&self.0[start..start + length]);
        Ok(length)
    }

    fn commit(&mut self, image: &[u8]) -> Result<(), Infallible> {
        self.0.clear();
        self.0.extend_from_slice(image);
        Ok(())
    }
}

pub(crate) struct Wrapper<D>(D);

impl<E, T, D> Wrapper<D>
where
    T: IO<Error = E>,
    D: DerefMut<Target = T>,
{
    pub fn len(&mut self) -> Result<u64, Error<E>> {
        self.0.len().map_err(|e| Error::IO(e))
    }

    /// Reads as much as available, the remainder of `buf` is zero filled
    pub fn read_padded(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, Error<E>> {
        let mut filled = 0;
        while filled < buf.len() {
            let result = self.0.read(offset + filled as u64, &mut buf[filled..]);
            match result.map_err(|e| Error::IO(e))? {
                0 => break,
                n => filled += n,
            }
        }
        buf[filled..].fill(0);
        Ok(filled)
    }

    pub fn commit(&mut self, image: &[u8]) -> Result<(), Error<E>> {
        self.0.commit(image).map_err(|e| Error::IO(e))
    }
}

pub(crate) trait Wrap {
    type Output;
    fn wrap(self) -> Self::Output;
}

impl<E, T, D> Wrap for D
where
    T: IO<Error = E>,
    D: DerefMut<Target = T>,
{
    type Output = Wrapper<D>;
    fn wrap(self) -> Self::Output {
        Wrapper(self)
    }
}
