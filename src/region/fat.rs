use crate::types::SectorID;

pub(crate) const DIFAT_SECTOR: u32 = 0xFFFF_FFFC;
pub(crate) const FAT_SECTOR: u32 = 0xFFFF_FFFD;
pub(crate) const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
pub(crate) const FREE: u32 = 0xFFFF_FFFF;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Entry {
    Next(SectorID),
    EndOfChain,
    FatSector,
    DifatSector,
    Free,
}

impl TryFrom<u32> for Entry {
    type Error = u32;
    fn try_from(value: u32) -> Result<Self, u32> {
        match value {
            0..=SectorID::MAX => Ok(Self::Next(value.into())),
            DIFAT_SECTOR => Ok(Self::DifatSector),
            FAT_SECTOR => Ok(Self::FatSector),
            END_OF_CHAIN => Ok(Self::EndOfChain),
            FREE => Ok(Self::Free),
            _ => Err(value),
        }
    }
}

impl From<Entry> for u32 {
    fn from(entry: Entry) -> u32 {
        match entry {
            Entry::Next(id) => id.into(),
            Entry::EndOfChain => END_OF_CHAIN,
            Entry::FatSector => FAT_SECTOR,
            Entry::DifatSector => DIFAT_SECTOR,
            Entry::Free => FREE,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert_eq!(Entry::try_from(5), Ok(Entry::Next(5.into())));
        assert_eq!(Entry::try_from(0xFFFF_FFFE), Ok(Entry::EndOfChain));
        assert_eq!(Entry::try_from(0xFFFF_FFFB), Err(0xFFFF_FFFB));
        // Signed view: -1 free, -2 end of chain
        assert_eq!(u32::from(Entry::Free) as i32, -1);
        assert_eq!(u32::from(Entry::EndOfChain) as i32, -2);
        assert_eq!(u32::from(Entry::FatSector) as i32, -3);
        assert_eq!(u32::from(Entry::DifatSector) as i32, -4);
    }
}
