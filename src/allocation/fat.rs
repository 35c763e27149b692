use alloc::vec::Vec;

use super::difat::Layout;
use super::{AllocationTable, Allocator};
use crate::error::CorruptError;
use crate::region::fat::{DIFAT_SECTOR, END_OF_CHAIN, FAT_SECTOR, FREE};
use crate::region::header::HEADER_DIFAT_ENTRIES;
use crate::types::SectorID;

/// Main sector allocation table together with the sectors that store it
#[derive(Clone, Debug)]
pub(crate) struct Fat {
    pub table: AllocationTable,
    pub layout: Layout,
    per_sector: usize,
}

impl Fat {
    pub fn new(per_sector: usize) -> Self {
        let table = AllocationTable::default();
        Self { table, layout: Layout::default(), per_sector }
    }

    pub fn load(table: AllocationTable, layout: Layout, per_sector: usize) -> Result<Self, CorruptError> {
        let mut fat = Self { table, layout, per_sector };
        for index in 0..fat.layout.fat_sectors.len() {
            fat.mark(fat.layout.fat_sectors[index], FAT_SECTOR)?;
        }
        for index in 0..fat.layout.difat_sectors.len() {
            fat.mark(fat.layout.difat_sectors[index], DIFAT_SECTOR)?;
        }
        Ok(fat)
    }

    fn mark(&mut self, id: SectorID, value: u32) -> Result<(), CorruptError> {
        match self.table.get(id) {
            Some(entry) if entry != value => {
                warn!("Sector {} holds allocation data but is marked {:#x}", id, entry);
                self.table.set(id, value);
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(CorruptError::SectorOutOfRange(id.into())),
        }
    }

    /// Number of FAT sector locations the header and the current DIFAT sectors can hold
    fn difat_capacity(&self) -> usize {
        HEADER_DIFAT_ENTRIES + self.layout.difat_sectors.len() * (self.per_sector - 1)
    }

    /// Appends one FAT sector worth of free entries, the first of which stores the FAT itself
    fn grow(&mut self) {
        let base = SectorID::from(self.table.len() as u32);
        self.table.extend_free(self.per_sector);
        self.table.set(base, FAT_SECTOR);
        self.layout.fat_sectors.push(base);
        if self.layout.fat_sectors.len() > self.difat_capacity() {
            let difat = base + 1u32;
            self.table.set(difat, DIFAT_SECTOR);
            self.layout.difat_sectors.push(difat);
            debug!("DIFAT sector {} registered", difat);
        }
        debug!("FAT grows to {} sectors", self.layout.fat_sectors.len());
    }

    /// Number of sectors the container must hold
    pub fn sector_count(&self) -> usize {
        self.table.used_len()
    }

    /// Bytes of the n-th FAT sector
    pub fn fat_sector_bytes(&self, nth: usize) -> Vec<u8> {
        let entries = self.table.entries();
        let start = nth * self.per_sector;
        let mut bytes = Vec::with_capacity(self.per_sector * 4);
        for index in start..start + self.per_sector {
            let entry = entries.get(index).copied().unwrap_or(FREE);
            bytes.extend_from_slice(&entry.to_le_bytes());
        }
        bytes
    }
}

impl Allocator for Fat {
    fn table(&mut self) -> &mut AllocationTable {
        &mut self.table
    }

    fn allocate_one(&mut self) -> SectorID {
        loop {
            if let Some(id) = self.table.find_free() {
                self.table.set(id, END_OF_CHAIN);
                return id;
            }
            self.grow();
        }
    }
}
