#![allow(dead_code)]

use std::collections::HashSet;

pub const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
pub const FREE: u32 = 0xFFFF_FFFF;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

pub fn put_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Minimal reader of a saved image, independent from the crate internals
pub struct Image<'a> {
    pub bytes: &'a [u8],
    pub sector_size: usize,
    pub fat: Vec<u32>,
}

impl<'a> Image<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        let shift = u16::from_le_bytes([bytes[0x1E], bytes[0x1F]]);
        let sector_size = 1usize << shift;
        let per_sector = sector_size / 4;
        let mut fat_sectors: Vec<u32> = (0..109)
            .map(|index| u32_at(bytes, 0x4C + index * 4))
            .filter(|&id| id != FREE)
            .collect();
        let mut difat = u32_at(bytes, 0x44);
        while difat != END_OF_CHAIN && difat != FREE {
            let offset = (difat as usize + 1) * sector_size;
            for index in 0..per_sector - 1 {
                let id = u32_at(bytes, offset + index * 4);
                if id != FREE {
                    fat_sectors.push(id);
                }
            }
            difat = u32_at(bytes, offset + (per_sector - 1) * 4);
        }
        let num_fat_sectors = u32_at(bytes, 0x2C) as usize;
        assert_eq!(fat_sectors.len(), num_fat_sectors);
        let mut fat = Vec::with_capacity(fat_sectors.len() * per_sector);
        for id in fat_sectors {
            let offset = (id as usize + 1) * sector_size;
            fat.extend((0..per_sector).map(|index| u32_at(bytes, offset + index * 4)));
        }
        Self { bytes, sector_size, fat }
    }

    pub fn sector_offset(&self, id: u32) -> usize {
        (id as usize + 1) * self.sector_size
    }

    pub fn total_sectors(&self) -> usize {
        self.bytes.len() / self.sector_size - 1
    }

    /// Follows a chain, panicking on cycles or chains longer than the image
    pub fn chain(&self, start: u32) -> Vec<u32> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = start;
        while current != END_OF_CHAIN {
            assert!((current as usize) < self.total_sectors(), "sector {} out of range", current);
            assert!(seen.insert(current), "sector {} visited twice", current);
            assert!(chain.len() <= self.total_sectors());
            chain.push(current);
            current = self.fat[current as usize];
        }
        chain
    }

    pub fn directory_offset(&self, index: usize) -> usize {
        let per_sector = self.sector_size / 128;
        let chain = self.chain(u32_at(self.bytes, 0x30));
        self.sector_offset(chain[index / per_sector]) + (index % per_sector) * 128
    }

    /// (object type, start sector, size) of every directory slot
    pub fn entries(&self) -> Vec<(u8, u32, u64)> {
        let chain = self.chain(u32_at(self.bytes, 0x30));
        let mut entries = Vec::new();
        for id in chain {
            let sector = &self.bytes[self.sector_offset(id)..][..self.sector_size];
            for entry in sector.chunks_exact(128) {
                let size = u64::from_le_bytes(entry[0x78..0x80].try_into().unwrap());
                entries.push((entry[0x42], u32_at(entry, 0x74), size));
            }
        }
        entries
    }
}
