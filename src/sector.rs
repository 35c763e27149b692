use crate::error::FormatError;
use crate::region::header::{MINI_SECTOR_SHIFT, MINI_STREAM_CUTOFF};
use crate::types::SectorID;

/// Sector sizes and the mini stream cutoff of one container
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Geometry {
    pub sector_shift: u8,
    pub mini_sector_shift: u8,
    pub mini_cutoff: u32,
}

impl Geometry {
    pub fn new(sector_shift: u8) -> Self {
        Self { sector_shift, mini_sector_shift: MINI_SECTOR_SHIFT as u8, mini_cutoff: MINI_STREAM_CUTOFF }
    }

    #[inline]
    pub fn sector_size(&self) -> usize {
        1 << self.sector_shift
    }

    #[inline]
    pub fn mini_sector_size(&self) -> usize {
        1 << self.mini_sector_shift
    }

    /// Number of u32 entries in one FAT, mini FAT or DIFAT sector
    #[inline]
    pub fn entries_per_sector(&self) -> usize {
        self.sector_size() / 4
    }

    /// The header occupies a whole sector, zero padded in 4096-byte containers
    #[inline]
    pub fn header_size(&self) -> u64 {
        self.sector_size() as u64
    }

    pub fn sector_to_offset(&self, id: SectorID) -> u64 {
        self.header_size() + (u32::from(id) as u64) * self.sector_size() as u64
    }

    pub fn offset_to_sector(&self, offset: u64) -> Result<SectorID, FormatError> {
        let size = self.sector_size() as u64;
        if offset < self.header_size() || offset % size != 0 {
            return Err(FormatError::Misaligned(offset));
        }
        let index = (offset - self.header_size()) / size;
        match u32::try_from(index) {
            Ok(index) if index <= SectorID::MAX => Ok(index.into()),
            _ => Err(FormatError::Misaligned(offset)),
        }
    }

    /// Number of sectors of `unit` bytes needed to hold `size` bytes
    pub fn units(size: u64, unit: usize) -> usize {
        size.div_ceil(unit as u64) as usize
    }

    /// Same as `units` for sizes read from the file, `None` if the count does not fit
    pub fn checked_units(size: u64, unit: usize) -> Option<usize> {
        usize::try_from(size.div_ceil(unit as u64)).ok()
    }

    pub fn is_mini(&self, size: u64) -> bool {
        size < self.mini_cutoff as u64
    }
}

#[cfg(test)]
mod test {
    use super::Geometry;
    use crate::error::FormatError;
    use crate::types::SectorID;

    #[test]
    fn test_offset_translation() {
        let v3 = Geometry::new(9);
        assert_eq!(v3.sector_to_offset(0u32.into()), 512);
        assert_eq!(v3.sector_to_offset(3u32.into()), 2048);
        assert_eq!(v3.offset_to_sector(2048), Ok(SectorID::from(3u32)));

        let v4 = Geometry::new(12);
        assert_eq!(v4.sector_to_offset(1u32.into()), 8192);
        assert_eq!(v4.offset_to_sector(8192), Ok(SectorID::from(1u32)));
        assert_eq!(v4.entries_per_sector(), 1024);
    }

    #[test]
    fn test_misaligned_offset() {
        let geometry = Geometry::new(9);
        assert_eq!(geometry.offset_to_sector(513), Err(FormatError::Misaligned(513)));
        assert_eq!(geometry.offset_to_sector(0), Err(FormatError::Misaligned(0)));
    }

    #[test]
    fn test_threshold() {
        let geometry = Geometry::new(9);
        assert!(geometry.is_mini(4095));
        assert!(!geometry.is_mini(4096));
        assert_eq!(Geometry::units(0, 64), 0);
        assert_eq!(Geometry::units(65, 64), 2);
    }

    #[test]
    fn test_unit_count_of_huge_size() {
        assert_eq!(Geometry::units(u64::MAX, 4096), (u64::MAX / 4096 + 1) as usize);
        assert_eq!(Geometry::checked_units(u64::MAX, 64), usize::try_from(u64::MAX / 64 + 1).ok());
        assert_eq!(Geometry::checked_units(4097, 4096), Some(2));
        if usize::BITS < 64 {
            assert_eq!(Geometry::checked_units(u64::MAX, 512), None);
        }
    }
}
