/// Container format version, decides the sector size of a new container
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Version {
    /// 512-byte sectors
    #[default]
    V3,
    /// 4096-byte sectors
    V4,
}

impl Version {
    pub(crate) fn sector_shift(self) -> u16 {
        match self {
            Self::V3 => 9,
            Self::V4 => 12,
        }
    }

    pub(crate) fn from_sector_shift(shift: u8) -> Self {
        match shift {
            12 => Self::V4,
            _ => Self::V3,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Truncate corrupt chains at the point of corruption instead of failing.
    /// Every truncation is logged as a warning.
    pub salvage: bool,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn salvage(mut self, salvage: bool) -> Self {
        self.salvage = salvage;
        self
    }
}
