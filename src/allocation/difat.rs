use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use crate::endian::Little as LE;
use crate::error::{CorruptError, Error};
use crate::region::fat::{END_OF_CHAIN, FREE};
use crate::region::header::HEADER_DIFAT_ENTRIES;
use crate::types::SectorID;

/// Sectors holding the FAT and the DIFAT, each sector claimed once
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Layout {
    pub fat_sectors: Vec<SectorID>,
    pub difat_sectors: Vec<SectorID>,
}

struct Claims(BTreeSet<u32>);

impl Claims {
    fn claim(&mut self, id: u32) -> Result<SectorID, CorruptError> {
        if id > SectorID::MAX {
            return Err(CorruptError::SectorOutOfRange(id));
        }
        if !self.0.insert(id) {
            return Err(CorruptError::SectorClaimed(id));
        }
        Ok(id.into())
    }
}

/// Builds the ordered FAT sector list from the header inline entries and the DIFAT chain.
///
/// `read` loads one whole sector into the given buffer
pub(crate) fn resolve<E, F>(
    inline: &[u32; HEADER_DIFAT_ENTRIES],
    num_fat_sectors: usize,
    first_difat_sector: u32,
    sector_size: usize,
    mut read: F,
) -> Result<Layout, Error<E>>
where
    F: FnMut(SectorID, &mut [u8]) -> Result<(), Error<E>>,
{
    let per_sector = sector_size / 4;
    let mut claims = Claims(BTreeSet::new());
    let mut layout = Layout::default();
    for &entry in inline.iter().take(num_fat_sectors) {
        layout.fat_sectors.push(claims.claim(entry)?);
    }

    let mut buffer = alloc::vec![0u8; sector_size];
    let mut next = first_difat_sector;
    while layout.fat_sectors.len() < num_fat_sectors {
        if next == END_OF_CHAIN || next == FREE {
            return Err(CorruptError::BrokenChain(next).into());
        }
        let id = SectorID::from(next);
        if layout.difat_sectors.contains(&id) {
            return Err(CorruptError::DifatCycle(next).into());
        }
        layout.difat_sectors.push(claims.claim(next)?);
        read(id, &mut buffer)?;
        let remain = num_fat_sectors - layout.fat_sectors.len();
        for index in 0..core::cmp::min(remain, per_sector - 1) {
            let entry = LE::<u32>::read(&buffer[index * 4..]);
            layout.fat_sectors.push(claims.claim(entry)?);
        }
        next = LE::<u32>::read(&buffer[(per_sector - 1) * 4..]);
    }
    debug!("FAT in {} sectors, DIFAT in {} sectors", num_fat_sectors, layout.difat_sectors.len());
    Ok(layout)
}

/// Header inline entries plus the bytes of every DIFAT sector
pub(crate) fn serialize(
    layout: &Layout,
    sector_size: usize,
) -> ([u32; HEADER_DIFAT_ENTRIES], Vec<Vec<u8>>) {
    let per_sector = sector_size / 4;
    let mut inline = [FREE; HEADER_DIFAT_ENTRIES];
    for (slot, &id) in inline.iter_mut().zip(layout.fat_sectors.iter()) {
        *slot = id.into();
    }
    let mut remain = layout.fat_sectors.iter().skip(HEADER_DIFAT_ENTRIES);
    let mut sectors = Vec::with_capacity(layout.difat_sectors.len());
    for (index, _) in layout.difat_sectors.iter().enumerate() {
        let mut bytes = Vec::with_capacity(sector_size);
        for _ in 0..per_sector - 1 {
            let entry = remain.next().map(|&id| u32::from(id)).unwrap_or(FREE);
            bytes.extend_from_slice(&entry.to_le_bytes());
        }
        let next = match layout.difat_sectors.get(index + 1) {
            Some(&id) => u32::from(id),
            None => END_OF_CHAIN,
        };
        bytes.extend_from_slice(&next.to_le_bytes());
        sectors.push(bytes);
    }
    (inline, sectors)
}
