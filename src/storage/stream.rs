use alloc::vec::Vec;
use core::fmt::Debug;

use super::context::Context;
use crate::acquire;
use crate::error::{Error, InputError};
use crate::sync::Shared;
use crate::types::EntryID;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SeekFrom {
    Start(u64),
    End(i64),
    Current(i64),
}

/// Seekable byte stream over one stream entry.
///
/// Data is routed through the mini FAT or the main FAT depending on the
/// stream size, writes past the end extend the stream with zeros.
pub struct Stream<IO: crate::io::IO> {
    context: Shared<Context<IO>>,
    id: EntryID,
    cursor: u64,
    mark: u64,
}

impl<IO: crate::io::IO> Stream<IO> {
    pub(crate) fn new(context: Shared<Context<IO>>, id: EntryID) -> Self {
        Self { context, id, cursor: 0, mark: 0 }
    }

    pub fn id(&self) -> EntryID {
        self.id
    }

    pub fn size(&self) -> u64 {
        acquire!(self.context).directory.node(self.id).size
    }

    /// Current cursor position
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Bytes between the cursor and the end of stream
    pub fn available(&self) -> u64 {
        self.size().saturating_sub(self.cursor)
    }

    /// Remembers the cursor position for a later `reset`
    pub fn mark(&mut self) {
        self.mark = self.cursor;
    }

    pub fn reset(&mut self) {
        self.cursor = self.mark;
    }

    /// Advances the cursor by at most `count` bytes without passing the end, returns the distance moved
    pub fn skip(&mut self, count: u64) -> u64 {
        let skipped = core::cmp::min(count, self.available());
        self.cursor += skipped;
        skipped
    }
}

impl<E: Debug, IO: crate::io::IO<Error = E>> Stream<IO> {
    /// Reads up to `buf.len()` bytes, returns 0 at end of stream
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error<E>> {
        let length = core::cmp::min(buf.len() as u64, self.available()) as usize;
        if length == 0 {
            return Ok(0);
        }
        acquire!(self.context).read_at(self.id, self.cursor, &mut buf[..length])?;
        self.cursor += length as u64;
        Ok(length)
    }

    /// Fills `buf` completely or fails with `OutOfBounds` leaving the cursor untouched
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error<E>> {
        acquire!(self.context).read_at(self.id, self.cursor, buf)?;
        self.cursor += buf.len() as u64;
        Ok(())
    }

    pub fn read_to_end(&mut self, buf: &mut Vec<u8>) -> Result<usize, Error<E>> {
        let length = self.available() as usize;
        let start = buf.len();
        buf.resize(start + length, 0);
        if let Err(e) = self.read_exact(&mut buf[start..]) {
            buf.truncate(start);
            return Err(e);
        }
        Ok(length)
    }

    /// Positional read, the cursor does not move
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error<E>> {
        acquire!(self.context).read_at(self.id, offset, buf)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize, Error<E>> {
        acquire!(self.context).write_at(self.id, self.cursor, data)?;
        self.cursor += data.len() as u64;
        Ok(data.len())
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<(), Error<E>> {
        self.write(data).map(|_| ())
    }

    /// Positional write, the cursor does not move
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<(), Error<E>> {
        acquire!(self.context).write_at(self.id, offset, data)
    }

    /// Change current cursor position, positions past the end are allowed
    pub fn seek(&mut self, seek_from: SeekFrom) -> Result<u64, Error<E>> {
        let option = match seek_from {
            SeekFrom::Start(cursor) => i64::try_from(cursor).ok(),
            SeekFrom::End(offset) => (self.size() as i64).checked_add(offset),
            SeekFrom::Current(offset) => (self.cursor as i64).checked_add(offset),
        };
        let cursor = option.ok_or(Error::Input(InputError::SeekPosition))?;
        if cursor < 0 {
            return Err(InputError::SeekPosition.into());
        }
        self.cursor = cursor as u64;
        Ok(self.cursor)
    }

    /// Shrink current stream size
    pub fn truncate(&mut self, size: u64) -> Result<(), Error<E>> {
        acquire!(self.context).truncate(self.id, size)?;
        self.cursor = core::cmp::min(self.cursor, size);
        self.mark = core::cmp::min(self.mark, size);
        Ok(())
    }
}

impl<IO: crate::io::IO> Drop for Stream<IO> {
    fn drop(&mut self) {
        acquire!(self.context).opened.remove(self.id);
    }
}

#[cfg(feature = "std")]
mod std_io {
    use std::io;

    use super::{SeekFrom, Stream};
    use crate::error::{Error, OperationError};

    fn convert<E: core::fmt::Debug>(error: Error<E>) -> io::Error {
        let kind = match &error {
            Error::Operation(OperationError::OutOfBounds { .. }) => io::ErrorKind::UnexpectedEof,
            Error::Operation(OperationError::NotFound) => io::ErrorKind::NotFound,
            Error::Input(_) => io::ErrorKind::InvalidInput,
            Error::Format(_) | Error::Corrupt(_) => io::ErrorKind::InvalidData,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, error.to_string())
    }

    impl<E: core::fmt::Debug, IO: crate::io::IO<Error = E>> io::Read for Stream<IO> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            Stream::read(self, buf).map_err(convert)
        }
    }

    impl<E: core::fmt::Debug, IO: crate::io::IO<Error = E>> io::Write for Stream<IO> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Stream::write(self, buf).map_err(convert)
        }

        /// Data reaches the container on `CompoundFile::save`
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<E: core::fmt::Debug, IO: crate::io::IO<Error = E>> io::Seek for Stream<IO> {
        fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
            let seek_from = match pos {
                io::SeekFrom::Start(offset) => SeekFrom::Start(offset),
                io::SeekFrom::End(offset) => SeekFrom::End(offset),
                io::SeekFrom::Current(offset) => SeekFrom::Current(offset),
            };
            Stream::seek(self, seek_from).map_err(convert)
        }
    }
}
