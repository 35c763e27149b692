use core::fmt::{self, Debug, Formatter, Result};

use displaydoc::Display;
use thiserror::Error;

/// Structural violations of the fixed-size layouts, opening must be aborted
#[derive(Copy, Clone, Debug, Display, Error, PartialEq, Eq)]
pub enum FormatError {
    /// Header signature mismatch, not a compound file
    Signature,
    /// Container is shorter than its header
    Truncated,
    /// Unsupported byte order mark {0:#06x}
    ByteOrder(u16),
    /// Invalid sector shift {0}, expect 9 or 12
    SectorShift(u16),
    /// Invalid mini sector shift {0}, expect 6
    MiniSectorShift(u16),
    /// Unsupported major version {0}
    Version(u16),
    /// Offset {0} is not aligned to a sector boundary
    Misaligned(u64),
    /// Directory entry {0} is malformed
    DirectoryEntry(u32),
    /// Root directory entry missing
    RootMissing,
}

/// Inconsistencies between allocation tables, chains and the directory
#[derive(Copy, Clone, Debug, Display, Error, PartialEq, Eq)]
pub enum CorruptError {
    /// Sector chain loops back to sector {0}
    ChainCycle(u32),
    /// Sector {0} lies outside of the container
    SectorOutOfRange(u32),
    /// Sector chain broken at sector {0}
    BrokenChain(u32),
    /// DIFAT chain loops back to sector {0}
    DifatCycle(u32),
    /// Sector {0} is claimed by more than one allocation structure
    SectorClaimed(u32),
    /// Directory entry {0} is referenced more than once
    DirectoryCycle(u32),
    /// Directory link to nonexistent entry {0}
    DirectoryLink(u32),
    /// Data chain of entry {0} is shorter than its declared size
    ShortStream(u32),
}

#[derive(Copy, Clone, Debug, Display, Error, PartialEq, Eq)]
pub enum InputError {
    /// Name longer than 31 UTF-16 code units
    NameTooLong,
    /// Name empty or containing one of '/', '\\', ':', '!'
    InvalidName,
    /// Empty path
    EmptyPath,
    /// Seek to a negative position
    SeekPosition,
    /// Truncate size larger than current size
    Size,
}

#[derive(Copy, Clone, Debug, Display, Error, PartialEq, Eq)]
pub enum OperationError {
    /// No such stream or storage
    NotFound,
    /// Storage not empty
    NotEmpty,
    /// Range {offset}+{length} exceeds stream size {size}
    OutOfBounds { offset: u64, length: usize, size: u64 },
    /// Entry already exists
    AlreadyExists,
    /// Stream already opened
    AlreadyOpen,
    /// Not a stream
    NotStream,
    /// Not a storage
    NotStorage,
    /// Root entry cannot be removed
    RootEntry,
}

#[derive(Copy, Clone, Debug, Display, Error, PartialEq, Eq)]
pub enum RecordError {
    /// Record header truncated at offset {0}
    TruncatedHeader(usize),
    /// Record 0x{sid:04x} declares {length} bytes but only {available} remain
    TruncatedPayload { sid: u16, length: usize, available: usize },
    /// Record 0x{sid:04x} length {length} exceeds physical limit
    Oversized { sid: u16, length: usize },
    /// Continuation record without a preceding record at offset {0}
    OrphanContinuation(usize),
    /// Unsplittable region at {offset} of {length} bytes does not fit in one record
    RegionTooLarge { offset: usize, length: usize },
    /// Unsplittable region at {offset} of {length} bytes lies outside of the payload
    RegionOutOfBounds { offset: usize, length: usize },
    /// Value of {0} bytes crosses a continuation boundary
    SplitValue(usize),
    /// Read past end of record
    EndOfRecord,
}

pub enum Error<E> {
    IO(E),
    Format(FormatError),
    Corrupt(CorruptError),
    Input(InputError),
    Operation(OperationError),
    Record(RecordError),
}

impl<E> Error<E> {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Operation(OperationError::NotFound))
    }
}

impl<E: Debug> Debug for Error<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Self::IO(e) => write!(f, "IO({:?})", e),
            Self::Format(e) => write!(f, "Format({:?})", e),
            Self::Corrupt(e) => write!(f, "Corrupt({:?})", e),
            Self::Input(e) => write!(f, "Input({:?})", e),
            Self::Operation(e) => write!(f, "Operation({:?})", e),
            Self::Record(e) => write!(f, "Record({:?})", e),
        }
    }
}

impl<E: Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Self::IO(e) => write!(f, "IO error: {:?}", e),
            Self::Format(e) => write!(f, "Format error: {}", e),
            Self::Corrupt(e) => write!(f, "Corrupt container: {}", e),
            Self::Input(e) => write!(f, "Invalid input: {}", e),
            Self::Operation(e) => write!(f, "{}", e),
            Self::Record(e) => write!(f, "Record error: {}", e),
        }
    }
}

impl<E: Debug> core::error::Error for Error<E> {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::IO(_) => None,
            Self::Format(e) => Some(e),
            Self::Corrupt(e) => Some(e),
            Self::Input(e) => Some(e),
            Self::Operation(e) => Some(e),
            Self::Record(e) => Some(e),
        }
    }
}

macro_rules! from {
    ($variant:ident, $type:ty) => {
        impl<E> From<$type> for Error<E> {
            fn from(e: $type) -> Self {
                Self::$variant(e)
            }
        }
    };
}

from!(Format, FormatError);
from!(Corrupt, CorruptError);
from!(Input, InputError);
from!(Operation, OperationError);
from!(Record, RecordError);
