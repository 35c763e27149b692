pub(crate) mod difat;
pub(crate) mod fat;
pub(crate) mod minifat;

use alloc::vec::Vec;

use crate::error::CorruptError;
use crate::region::fat::{Entry, END_OF_CHAIN, FREE};
use crate::types::SectorID;

/// In-memory copy of a FAT or mini FAT, one `next` pointer per sector
#[derive(Clone, Debug, Default)]
pub(crate) struct AllocationTable {
    entries: Vec<u32>,
    // Lowest index that may be free
    cursor: usize,
}

impl AllocationTable {
    pub fn new(entries: Vec<u32>) -> Self {
        Self { entries, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    pub fn get(&self, id: SectorID) -> Option<u32> {
        self.entries.get(id.index()).copied()
    }

    pub fn set(&mut self, id: SectorID, value: u32) {
        self.entries[id.index()] = value;
    }

    pub fn push(&mut self, value: u32) -> SectorID {
        self.entries.push(value);
        SectorID::from((self.entries.len() - 1) as u32)
    }

    pub fn extend_free(&mut self, count: usize) {
        self.entries.resize(self.entries.len() + count, FREE);
    }

    pub fn find_free(&mut self) -> Option<SectorID> {
        let offset = self.entries[self.cursor..].iter().position(|&entry| entry == FREE)?;
        self.cursor += offset;
        Some(SectorID::from(self.cursor as u32))
    }

    pub fn release(&mut self, id: SectorID) {
        self.entries[id.index()] = FREE;
        self.cursor = core::cmp::min(self.cursor, id.index());
    }

    /// Length up to and including the last non-free entry
    pub fn used_len(&self) -> usize {
        self.entries.iter().rposition(|&entry| entry != FREE).map(|index| index + 1).unwrap_or(0)
    }

    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
        self.cursor = core::cmp::min(self.cursor, len);
    }

    fn walk(&self, start: u32) -> (Vec<SectorID>, Option<CorruptError>) {
        let mut chain = Vec::new();
        if start == END_OF_CHAIN || start == FREE {
            return (chain, None);
        }
        let mut visited = alloc::vec![0u64; (self.entries.len() + 63) / 64];
        let mut current = start;
        loop {
            let index = current as usize;
            if index >= self.entries.len() {
                return (chain, Some(CorruptError::SectorOutOfRange(current)));
            }
            if visited[index / 64] & (1 << (index % 64)) != 0 {
                return (chain, Some(CorruptError::ChainCycle(current)));
            }
            visited[index / 64] |= 1 << (index % 64);
            chain.push(SectorID::from(current));
            match Entry::try_from(self.entries[index]) {
                Ok(Entry::Next(next)) => current = next.into(),
                Ok(Entry::EndOfChain) => return (chain, None),
                _ => return (chain, Some(CorruptError::BrokenChain(current))),
            }
        }
    }

    /// Follows a chain to END_OF_CHAIN, each sector is visited at most once
    pub fn chain(&self, start: u32) -> Result<Vec<SectorID>, CorruptError> {
        match self.walk(start) {
            (chain, None) => Ok(chain),
            (_, Some(error)) => Err(error),
        }
    }

    /// Like `chain`, but stops at the point of corruption and keeps the intact prefix
    pub fn salvage_chain(&self, start: u32) -> Vec<SectorID> {
        let (chain, error) = self.walk(start);
        if let Some(error) = error {
            warn!("Chain from {} truncated to {} sectors: {}", start, chain.len(), error);
        }
        chain
    }
}

/// Chain allocation shared by the FAT and the mini FAT
pub(crate) trait Allocator {
    fn table(&mut self) -> &mut AllocationTable;

    /// Claims one free sector, growing the table if none is left.
    /// The returned entry is marked END_OF_CHAIN
    fn allocate_one(&mut self) -> SectorID;

    /// Allocates `count` chained sectors, linking them after `tail` when given
    fn allocate(&mut self, count: usize, tail: Option<SectorID>) -> Vec<SectorID> {
        let mut sectors: Vec<SectorID> = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.allocate_one();
            if let Some(&previous) = sectors.last().or(tail.as_ref()) {
                self.table().set(previous, id.into());
            }
            sectors.push(id);
        }
        trace!("Allocated {} sectors after {:?}", count, tail);
        sectors
    }

    fn free(&mut self, chain: &[SectorID]) {
        trace!("Release {} sectors", chain.len());
        let table = self.table();
        for &id in chain {
            table.release(id);
        }
    }

    /// Grows or shrinks a chain to exactly `count` sectors, returning the appended ones
    fn resize(&mut self, chain: &mut Vec<SectorID>, count: usize) -> Vec<SectorID> {
        if count <= chain.len() {
            self.free(&chain[count..]);
            chain.truncate(count);
            if let Some(&last) = chain.last() {
                self.table().set(last, END_OF_CHAIN);
            }
            return Vec::new();
        }
        let appended = self.allocate(count - chain.len(), chain.last().copied());
        chain.extend_from_slice(&appended);
        appended
    }
}

#[cfg(test)]
mod test {
    use alloc::vec;

    use super::AllocationTable;
    use crate::error::CorruptError;
    use crate::region::fat::{END_OF_CHAIN, FREE};
    use crate::types::SectorID;

    fn ids(raw: &[u32]) -> alloc::vec::Vec<SectorID> {
        raw.iter().map(|&id| SectorID::from(id)).collect()
    }

    #[test]
    fn test_chain() {
        let table = AllocationTable::new(vec![2, END_OF_CHAIN, 3, 1, FREE]);
        assert_eq!(table.chain(0), Ok(ids(&[0, 2, 3, 1])));
        assert_eq!(table.chain(END_OF_CHAIN), Ok(ids(&[])));
        assert_eq!(table.chain(4), Err(CorruptError::BrokenChain(4)));
        assert_eq!(table.chain(9), Err(CorruptError::SectorOutOfRange(9)));
    }

    #[test]
    fn test_self_loop() {
        let mut entries = vec![FREE; 8];
        entries[4] = 5;
        entries[5] = 5;
        let table = AllocationTable::new(entries);
        assert_eq!(table.chain(4), Err(CorruptError::ChainCycle(5)));
        assert_eq!(table.salvage_chain(4), ids(&[4, 5]));
    }

    #[test]
    fn test_find_free() {
        let mut table = AllocationTable::new(vec![END_OF_CHAIN, FREE, END_OF_CHAIN, FREE]);
        assert_eq!(table.find_free(), Some(SectorID::from(1u32)));
        table.set(1u32.into(), END_OF_CHAIN);
        assert_eq!(table.find_free(), Some(SectorID::from(3u32)));
        table.set(3u32.into(), END_OF_CHAIN);
        assert_eq!(table.find_free(), None);
        table.release(0u32.into());
        assert_eq!(table.find_free(), Some(SectorID::from(0u32)));
        assert_eq!(table.used_len(), 4);
    }
}
