use core::fmt::{Display, Formatter};
use core::mem::size_of;

#[cfg(feature = "chrono")]
use chrono::{DateTime, TimeZone, Utc};

use crate::endian::Little as LE;
use crate::types::EntryID;

pub(crate) const ENTRY_SIZE: usize = 128;
/// Name field capacity in UTF-16 code units, including the terminating NUL
pub(crate) const NAME_CAPACITY: usize = 32;
pub(crate) type RawEntry = [u8; ENTRY_SIZE];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectType {
    Unused,
    Storage,
    Stream,
    Root,
}

impl TryFrom<u8> for ObjectType {
    type Error = u8;
    fn try_from(byte: u8) -> Result<Self, u8> {
        match byte {
            0 => Ok(Self::Unused),
            1 => Ok(Self::Storage),
            2 => Ok(Self::Stream),
            5 => Ok(Self::Root),
            _ => Err(byte),
        }
    }
}

impl From<ObjectType> for u8 {
    fn from(object_type: ObjectType) -> u8 {
        match object_type {
            ObjectType::Unused => 0,
            ObjectType::Storage => 1,
            ObjectType::Stream => 2,
            ObjectType::Root => 5,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum Color {
    Red,
    #[default]
    Black,
}

impl From<u8> for Color {
    fn from(byte: u8) -> Self {
        match byte {
            0 => Self::Red,
            _ => Self::Black,
        }
    }
}

impl From<Color> for u8 {
    fn from(color: Color) -> u8 {
        match color {
            Color::Red => 0,
            Color::Black => 1,
        }
    }
}

/// Class identifier associated with a storage
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Clsid(pub [u8; 16]);

impl Display for Clsid {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let b = &self.0;
        let data1 = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        let data2 = u16::from_le_bytes([b[4], b[5]]);
        let data3 = u16::from_le_bytes([b[6], b[7]]);
        write!(f, "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-", data1, data2, data3, b[8], b[9])?;
        for byte in &b[10..] {
            write!(f, "{:02X}", byte)?;
        }
        write!(f, "}}")
    }
}

/// Windows FILETIME, 100ns intervals since 1601-01-01 UTC
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileTime(pub u64);

/// 100ns intervals between 1601-01-01 and 1970-01-01
const UNIX_EPOCH_INTERVALS: u64 = 116_444_736_000_000_000;

impl FileTime {
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn now() -> Self {
        match () {
            #[cfg(all(feature = "chrono", feature = "std"))]
            () => Utc::now().into(),
            #[cfg(not(all(feature = "chrono", feature = "std")))]
            () => Self::default(),
        }
    }
}

#[cfg(feature = "chrono")]
impl<TZ: TimeZone> From<DateTime<TZ>> for FileTime {
    fn from(datetime: DateTime<TZ>) -> Self {
        let utc = datetime.with_timezone(&Utc);
        let intervals = utc.timestamp() as i128 * 10_000_000
            + (utc.timestamp_subsec_nanos() / 100) as i128
            + UNIX_EPOCH_INTERVALS as i128;
        Self(intervals.clamp(0, u64::MAX as i128) as u64)
    }
}

#[cfg(feature = "chrono")]
impl FileTime {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let unix = self.0 as i128 - UNIX_EPOCH_INTERVALS as i128;
        let seconds = unix.div_euclid(10_000_000) as i64;
        let nanos = (unix.rem_euclid(10_000_000) * 100) as u32;
        DateTime::from_timestamp(seconds, nanos)
    }
}

#[derive(Copy, Clone, Debug)]
#[repr(C, packed(1))]
pub(crate) struct DirectoryEntry {
    pub name: [LE<u16>; NAME_CAPACITY],
    pub name_length: LE<u16>, // bytes, including terminator
    pub object_type: u8,
    pub color: u8,
    pub left: LE<u32>,
    pub right: LE<u32>,
    pub child: LE<u32>,
    pub clsid: [u8; 16],
    pub state_bits: LE<u32>,
    pub created: LE<u64>,
    pub modified: LE<u64>,
    pub start_sector: LE<u32>,
    pub size: LE<u64>,
}

const _: () = assert!(size_of::<DirectoryEntry>() == ENTRY_SIZE);

impl Default for DirectoryEntry {
    fn default() -> Self {
        let none: LE<u32> = EntryID::NONE.into();
        Self {
            name: [LE::default(); NAME_CAPACITY],
            name_length: LE::default(),
            object_type: ObjectType::Unused.into(),
            color: 0,
            left: none,
            right: none,
            child: none,
            clsid: [0; 16],
            state_bits: LE::default(),
            created: LE::default(),
            modified: LE::default(),
            start_sector: LE::default(),
            size: LE::default(),
        }
    }
}

impl DirectoryEntry {
    pub fn parse(bytes: &[u8]) -> Self {
        unsafe { core::ptr::read_unaligned(bytes.as_ptr() as *const Self) }
    }

    pub fn to_bytes(&self) -> RawEntry {
        unsafe { core::mem::transmute(*self) }
    }

    /// Name as UTF-16 code units without terminator, None if the length field is malformed
    pub fn name_units(&self) -> Option<heapless::Vec<u16, NAME_CAPACITY>> {
        let length = self.name_length.to_ne() as usize;
        if length > NAME_CAPACITY * 2 || length % 2 != 0 {
            return None;
        }
        let name = self.name;
        let units = length.saturating_sub(2) / 2;
        Some(name[..units].iter().map(|unit| unit.to_ne()).collect())
    }

    pub fn object_type(&self) -> Result<ObjectType, u8> {
        ObjectType::try_from(self.object_type)
    }
}

#[cfg(test)]
mod test {
    use memoffset::offset_of;

    use super::*;

    #[test]
    fn test_layout_offsets() {
        assert_eq!(offset_of!(DirectoryEntry, name_length), 0x40);
        assert_eq!(offset_of!(DirectoryEntry, object_type), 0x42);
        assert_eq!(offset_of!(DirectoryEntry, left), 0x44);
        assert_eq!(offset_of!(DirectoryEntry, child), 0x4C);
        assert_eq!(offset_of!(DirectoryEntry, clsid), 0x50);
        assert_eq!(offset_of!(DirectoryEntry, created), 0x64);
        assert_eq!(offset_of!(DirectoryEntry, start_sector), 0x74);
        assert_eq!(offset_of!(DirectoryEntry, size), 0x78);
    }

    #[test]
    fn test_unused_entry_bytes() {
        let bytes = DirectoryEntry::default().to_bytes();
        assert!(bytes[..0x44].iter().all(|&b| b == 0));
        assert!(bytes[0x44..0x50].iter().all(|&b| b == 0xFF));
        assert!(bytes[0x50..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clsid_display() {
        let clsid = Clsid(hex!("20 08 02 00 00 00 00 00 C0 00 00 00 00 00 00 46"));
        assert_eq!(clsid.to_string(), "{00020820-0000-0000-C000-000000000046}");
    }

    #[cfg(feature = "chrono")]
    #[test]
    fn test_filetime_chrono() {
        let datetime = DateTime::from_timestamp(1_000_000_000, 500).unwrap();
        let filetime = FileTime::from(datetime);
        assert_eq!(filetime.0, 1_000_000_000 * 10_000_000 + 5 + UNIX_EPOCH_INTERVALS);
        assert_eq!(filetime.to_datetime().unwrap().timestamp(), 1_000_000_000);
        assert_eq!(FileTime(UNIX_EPOCH_INTERVALS).to_datetime().unwrap().timestamp(), 0);
    }
}
