use alloc::vec::Vec;

use super::{AllocationTable, Allocator};
use crate::region::fat::{END_OF_CHAIN, FREE};
use crate::types::SectorID;

/// Mini FAT plus the mini stream it allocates from, both held in memory.
///
/// The mini stream is persisted as the root entry's data chain, the table
/// as its own chain in the main FAT.
#[derive(Clone, Debug)]
pub(crate) struct MiniFat {
    pub table: AllocationTable,
    pub stream: Vec<u8>,
    /// Main FAT chain holding the table
    pub chain: Vec<SectorID>,
    /// Main FAT chain holding the mini stream
    pub stream_chain: Vec<SectorID>,
    mini_sector_size: usize,
}

impl MiniFat {
    pub fn new(mini_sector_size: usize) -> Self {
        Self {
            table: AllocationTable::default(),
            stream: Vec::new(),
            chain: Vec::new(),
            stream_chain: Vec::new(),
            mini_sector_size,
        }
    }

    pub fn load(
        table: AllocationTable,
        stream: Vec<u8>,
        chain: Vec<SectorID>,
        stream_chain: Vec<SectorID>,
        mini_sector_size: usize,
    ) -> Self {
        Self { table, stream, chain, stream_chain, mini_sector_size }
    }

    pub fn offset(&self, id: SectorID) -> usize {
        id.index() * self.mini_sector_size
    }

    /// Drops trailing free mini sectors, returns the table as little endian bytes
    pub fn compact(&mut self) -> Vec<u8> {
        let used = self.table.used_len();
        self.table.truncate(used);
        self.stream.truncate(used * self.mini_sector_size);
        let mut bytes = Vec::with_capacity(used * 4);
        for entry in self.table.entries() {
            bytes.extend_from_slice(&entry.to_le_bytes());
        }
        bytes
    }
}

impl Allocator for MiniFat {
    fn table(&mut self) -> &mut AllocationTable {
        &mut self.table
    }

    fn allocate_one(&mut self) -> SectorID {
        let id = match self.table.find_free() {
            Some(id) => id,
            None => self.table.push(FREE),
        };
        self.table.set(id, END_OF_CHAIN);
        let offset = self.offset(id);
        let end = offset + self.mini_sector_size;
        if self.stream.len() < end {
            self.stream.resize(end, 0);
        }
        self.stream[offset..end].fill(0);
        id
    }
}
