use derive_more::{Display, From, Into};

/// Index of a regular (big) sector, sector 0 starts right after the header
#[derive(Copy, Clone, Debug, Default, Display, From, Into, Eq, Hash, Ord, PartialOrd, PartialEq)]
pub struct SectorID(u32);

impl SectorID {
    /// Largest value that still names a real sector, everything above is a sentinel
    pub const MAX: u32 = 0xFFFF_FFFA;

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl<I: Into<u32>> core::ops::Add<I> for SectorID {
    type Output = Self;

    fn add(self, rhs: I) -> Self {
        Self(self.0 + rhs.into())
    }
}

/// Index of a 128-byte slot inside the directory stream
#[derive(Copy, Clone, Debug, Default, Display, From, Into, Eq, Hash, Ord, PartialOrd, PartialEq)]
pub struct EntryID(u32);

impl EntryID {
    pub const ROOT: Self = Self(0);
    /// On-disk "no sibling / no child" marker
    pub(crate) const NONE: u32 = 0xFFFF_FFFF;

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            Self::NONE => None,
            raw => Some(Self(raw)),
        }
    }
}
