use core::cmp::Ordering;
use core::fmt::{Display, Formatter};

use crate::error::InputError;

/// Maximum name length in UTF-16 code units, the terminator takes the 32nd slot
pub const MAX_NAME_LENGTH: usize = 31;

/// Name of a stream or storage, stored as UTF-16 code units
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct EntryName(heapless::Vec<u16, MAX_NAME_LENGTH>);

fn fold(unit: u16) -> u16 {
    match char::from_u32(unit as u32) {
        Some(c) if c.is_ascii() => c.to_ascii_uppercase() as u16,
        Some(c) => {
            let mut upper = c.to_uppercase();
            match (upper.next(), upper.next()) {
                (Some(u), None) if (u as u32) <= 0xFFFF => u as u16,
                _ => unit,
            }
        }
        None => unit,
    }
}

impl EntryName {
    pub fn new(name: &str) -> Result<Self, InputError> {
        if name.is_empty() || name.contains(['/', '\\', ':', '!']) {
            return Err(InputError::InvalidName);
        }
        let mut units = heapless::Vec::new();
        for unit in name.encode_utf16() {
            units.push(unit).map_err(|_| InputError::NameTooLong)?;
        }
        Ok(Self(units))
    }

    /// Name as read from a directory entry, only the length is checked
    pub(crate) fn from_units(units: &[u16]) -> Option<Self> {
        heapless::Vec::from_slice(units).ok().map(Self)
    }

    pub fn units(&self) -> &[u16] {
        &self.0
    }

    /// Directory ordering: shorter names first, then code units compared case-insensitively
    pub fn cfb_cmp(&self, other: &Self) -> Ordering {
        let ordering = self.0.len().cmp(&other.0.len());
        if ordering != Ordering::Equal {
            return ordering;
        }
        let lhs = self.0.iter().map(|&unit| fold(unit));
        lhs.cmp(other.0.iter().map(|&unit| fold(unit)))
    }
}

impl Display for EntryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        for c in char::decode_utf16(self.0.iter().copied()) {
            write!(f, "{}", c.unwrap_or(char::REPLACEMENT_CHARACTER))?;
        }
        Ok(())
    }
}

impl TryFrom<&str> for EntryName {
    type Error = InputError;
    fn try_from(name: &str) -> Result<Self, InputError> {
        Self::new(name)
    }
}
