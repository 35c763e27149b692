use core::mem::size_of;

use crate::endian::Little as LE;
use crate::error::FormatError;
use crate::region::fat::{END_OF_CHAIN, FREE};

pub(crate) const HEADER_SIZE: usize = 512;
pub(crate) const SIGNATURE: [u8; 8] = hex!("D0 CF 11 E0 A1 B1 1A E1");
pub(crate) const BYTE_ORDER: u16 = 0xFFFE;
pub(crate) const MINOR_VERSION: u16 = 0x003E;
pub(crate) const MINI_SECTOR_SHIFT: u16 = 6;
pub(crate) const MINI_STREAM_CUTOFF: u32 = 4096;
/// Number of FAT sector locations stored inline in the header
pub(crate) const HEADER_DIFAT_ENTRIES: usize = 109;

#[derive(Copy, Clone, Debug)]
#[repr(C, packed(1))]
pub(crate) struct Header {
    pub signature: [u8; 8],
    pub clsid: [u8; 16],
    pub minor_version: LE<u16>,
    pub major_version: LE<u16>,
    pub byte_order: LE<u16>,
    pub sector_shift: LE<u16>,      // 9 or 12
    pub mini_sector_shift: LE<u16>, // always 6
    _reserved: [u8; 6],
    pub num_directory_sectors: LE<u32>, // must be 0 for version 3
    pub num_fat_sectors: LE<u32>,
    pub first_directory_sector: LE<u32>,
    pub transaction_signature: LE<u32>,
    pub mini_stream_cutoff: LE<u32>,
    pub first_mini_fat_sector: LE<u32>,
    pub num_mini_fat_sectors: LE<u32>,
    pub first_difat_sector: LE<u32>,
    pub num_difat_sectors: LE<u32>,
    pub difat: [LE<u32>; HEADER_DIFAT_ENTRIES],
}

const _: () = assert!(size_of::<Header>() == HEADER_SIZE);

impl Header {
    pub fn new(sector_shift: u16) -> Self {
        let major_version: u16 = if sector_shift == 12 { 4 } else { 3 };
        Self {
            signature: SIGNATURE,
            clsid: [0; 16],
            minor_version: MINOR_VERSION.into(),
            major_version: major_version.into(),
            byte_order: BYTE_ORDER.into(),
            sector_shift: sector_shift.into(),
            mini_sector_shift: MINI_SECTOR_SHIFT.into(),
            _reserved: [0; 6],
            num_directory_sectors: 0u32.into(),
            num_fat_sectors: 0u32.into(),
            first_directory_sector: END_OF_CHAIN.into(),
            transaction_signature: 0u32.into(),
            mini_stream_cutoff: MINI_STREAM_CUTOFF.into(),
            first_mini_fat_sector: END_OF_CHAIN.into(),
            num_mini_fat_sectors: 0u32.into(),
            first_difat_sector: END_OF_CHAIN.into(),
            num_difat_sectors: 0u32.into(),
            difat: [FREE.into(); HEADER_DIFAT_ENTRIES],
        }
    }

    pub fn is_cfb(bytes: &[u8]) -> bool {
        bytes.len() >= SIGNATURE.len() && bytes[..SIGNATURE.len()] == SIGNATURE
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        if !Self::is_cfb(bytes) {
            return Err(FormatError::Signature);
        }
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::Truncated);
        }
        let header: Self = unsafe { core::ptr::read_unaligned(bytes.as_ptr() as *const Self) };
        let byte_order = header.byte_order.to_ne();
        if byte_order != BYTE_ORDER {
            return Err(FormatError::ByteOrder(byte_order));
        }
        let sector_shift = header.sector_shift.to_ne();
        if sector_shift != 9 && sector_shift != 12 {
            return Err(FormatError::SectorShift(sector_shift));
        }
        let mini_sector_shift = header.mini_sector_shift.to_ne();
        if mini_sector_shift != MINI_SECTOR_SHIFT {
            return Err(FormatError::MiniSectorShift(mini_sector_shift));
        }
        let major_version = header.major_version.to_ne();
        match (major_version, sector_shift) {
            (3, 9) | (4, 12) => (),
            (3, _) | (4, _) => warn!("Version {} with sector shift {}", major_version, sector_shift),
            _ => return Err(FormatError::Version(major_version)),
        }
        Ok(header)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        unsafe { core::mem::transmute(*self) }
    }

    pub fn sector_shift(&self) -> u8 {
        self.sector_shift.to_ne() as u8
    }

    pub fn major_version(&self) -> u16 {
        self.major_version.to_ne()
    }
}

#[cfg(test)]
mod test {
    use memoffset::offset_of;

    use super::*;

    #[test]
    fn test_layout_offsets() {
        assert_eq!(offset_of!(Header, minor_version), 0x18);
        assert_eq!(offset_of!(Header, byte_order), 0x1C);
        assert_eq!(offset_of!(Header, sector_shift), 0x1E);
        assert_eq!(offset_of!(Header, num_directory_sectors), 0x28);
        assert_eq!(offset_of!(Header, num_fat_sectors), 0x2C);
        assert_eq!(offset_of!(Header, first_directory_sector), 0x30);
        assert_eq!(offset_of!(Header, mini_stream_cutoff), 0x38);
        assert_eq!(offset_of!(Header, first_mini_fat_sector), 0x3C);
        assert_eq!(offset_of!(Header, first_difat_sector), 0x44);
        assert_eq!(offset_of!(Header, num_difat_sectors), 0x48);
        assert_eq!(offset_of!(Header, difat), 0x4C);
    }

    #[test]
    fn test_parse_roundtrip() {
        let header = Header::new(9);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[..8], &SIGNATURE);
        assert_eq!(&bytes[0x1C..0x1E], &[0xFE, 0xFF]);
        let parsed = Header::parse(&bytes).unwrap();
        assert_eq!(parsed.sector_shift(), 9);
        assert_eq!(parsed.major_version(), 3);
        assert_eq!(parsed.mini_stream_cutoff.to_ne(), 4096);
    }

    #[test]
    fn test_reject_bad_header() {
        let mut bytes = Header::new(12).to_bytes();
        assert_eq!(Header::parse(&bytes[..100]).err(), Some(FormatError::Truncated));
        bytes[0x1E] = 10;
        assert_eq!(Header::parse(&bytes).err(), Some(FormatError::SectorShift(10)));
        bytes[0] = 0;
        assert_eq!(Header::parse(&bytes).err(), Some(FormatError::Signature));
    }
}
