use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::allocation::difat::{self, Layout};
use crate::allocation::fat::Fat;
use crate::allocation::minifat::MiniFat;
use crate::allocation::{AllocationTable, Allocator};
use crate::endian::Little as LE;
use crate::error::{CorruptError, Error, InputError, OperationError};
use crate::io::{Wrap, IO};
use crate::name::EntryName;
use crate::options::{OpenOptions, Version};
use crate::region::directory::ObjectType;
use crate::region::fat::{END_OF_CHAIN, FREE};
use crate::region::header::{Header, HEADER_DIFAT_ENTRIES, HEADER_SIZE, MINI_STREAM_CUTOFF};
use crate::sector::Geometry;
use crate::storage::directory::Directory;
use crate::types::{EntryID, SectorID};

/// Streams held by a `Stream` handle, kept sorted, and live `Storage` handles per entry
#[derive(Debug, Default)]
pub(crate) struct OpenedEntries {
    entries: Vec<EntryID>,
    storages: BTreeMap<EntryID, usize>,
}

impl OpenedEntries {
    pub(crate) fn add(&mut self, id: EntryID) -> bool {
        let index = match self.entries.binary_search(&id) {
            Ok(_) => return false,
            Err(index) => index,
        };
        self.entries.insert(index, id);
        true
    }

    pub(crate) fn remove(&mut self, id: EntryID) -> bool {
        let index = match self.entries.binary_search(&id) {
            Ok(index) => index,
            Err(_) => return false,
        };
        self.entries.remove(index);
        true
    }

    pub(crate) fn contains(&self, id: EntryID) -> bool {
        self.entries.binary_search(&id).is_ok() || self.storages.contains_key(&id)
    }

    pub(crate) fn retain(&mut self, id: EntryID) {
        *self.storages.entry(id).or_insert(0) += 1;
    }

    pub(crate) fn release(&mut self, id: EntryID) {
        if let Some(count) = self.storages.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                self.storages.remove(&id);
            }
        }
    }
}

enum Role {
    Fat(usize),
    Difat(usize),
}

fn from_le_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes.chunks_exact(4).map(|chunk| LE::<u32>::read(chunk)).collect()
}

/// Everything known about one open container.
///
/// Tables and the directory are loaded eagerly, stream sectors are read on
/// demand. Modified sectors stay in `cache` until `save` writes a complete
/// new image through `IO::commit`.
pub(crate) struct Context<IO> {
    io: IO,
    pub geometry: Geometry,
    header: Header,
    pub fat: Fat,
    pub minifat: MiniFat,
    pub directory: Directory,
    cache: BTreeMap<SectorID, Vec<u8>>,
    source_len: u64,
    salvage: bool,
    pub opened: OpenedEntries,
}

impl<E: Debug, IO: crate::io::IO<Error = E>> Context<IO> {
    pub fn create(io: IO, version: Version) -> Self {
        let sector_shift = version.sector_shift();
        let geometry = Geometry::new(sector_shift as u8);
        debug!("Create container with {} byte sectors", geometry.sector_size());
        Self {
            io,
            geometry,
            header: Header::new(sector_shift),
            fat: Fat::new(geometry.entries_per_sector()),
            minifat: MiniFat::new(geometry.mini_sector_size()),
            directory: Directory::new(),
            cache: BTreeMap::new(),
            source_len: 0,
            salvage: false,
            opened: OpenedEntries::default(),
        }
    }

    pub fn open(mut io: IO, options: OpenOptions) -> Result<Self, Error<E>> {
        let source_len = (&mut io).wrap().len()?;
        let mut bytes = [0u8; HEADER_SIZE];
        let filled = (&mut io).wrap().read_padded(0, &mut bytes)?;
        let header = Header::parse(&bytes[..filled])?;
        let mut geometry = Geometry::new(header.sector_shift());
        let cutoff = header.mini_stream_cutoff.to_ne();
        if cutoff != MINI_STREAM_CUTOFF {
            warn!("Mini stream cutoff {} differs from {}", cutoff, MINI_STREAM_CUTOFF);
            geometry.mini_cutoff = cutoff;
        }
        debug!("Open container of {} bytes, {} byte sectors", source_len, geometry.sector_size());
        if let Err(e) = geometry.offset_to_sector(source_len) {
            debug!("Last sector is partial, {}", e);
        }

        let mut context = Self {
            io,
            geometry,
            header,
            fat: Fat::new(geometry.entries_per_sector()),
            minifat: MiniFat::new(geometry.mini_sector_size()),
            directory: Directory::new(),
            cache: BTreeMap::new(),
            source_len,
            salvage: options.salvage,
            opened: OpenedEntries::default(),
        };
        context.load_fat()?;
        context.load_directory()?;
        context.load_minifat()?;
        Ok(context)
    }

    fn load_fat(&mut self) -> Result<(), Error<E>> {
        let header = self.header;
        let difat = header.difat;
        let inline: [u32; HEADER_DIFAT_ENTRIES] = core::array::from_fn(|index| difat[index].to_ne());
        let num_fat_sectors = header.num_fat_sectors.to_ne() as usize;
        let first_difat_sector = header.first_difat_sector.to_ne();
        let sector_size = self.geometry.sector_size();
        let layout: Layout = difat::resolve(&inline, num_fat_sectors, first_difat_sector, sector_size, |id, buf| {
            self.read_sector(id, buf)
        })?;
        if layout.difat_sectors.len() != header.num_difat_sectors.to_ne() as usize {
            warn!("Header declares {} DIFAT sectors, found {}", header.num_difat_sectors.to_ne(), layout.difat_sectors.len());
        }

        let mut entries = Vec::with_capacity(num_fat_sectors * self.geometry.entries_per_sector());
        let mut buffer = alloc::vec![0u8; sector_size];
        for &id in layout.fat_sectors.iter() {
            self.read_sector(id, &mut buffer)?;
            entries.extend(from_le_bytes(&buffer));
        }
        let per_sector = self.geometry.entries_per_sector();
        self.fat = Fat::load(AllocationTable::new(entries), layout, per_sector)?;
        debug!("FAT loaded, {} sectors in use", self.fat.sector_count());
        Ok(())
    }

    fn main_chain(&self, start: u32) -> Result<Vec<SectorID>, Error<E>> {
        match self.salvage {
            true => Ok(self.fat.table.salvage_chain(start)),
            false => Ok(self.fat.table.chain(start)?),
        }
    }

    fn read_chain(&mut self, chain: &[SectorID], length: usize) -> Result<Vec<u8>, Error<E>> {
        let sector_size = self.geometry.sector_size();
        let mut bytes = alloc::vec![0u8; chain.len() * sector_size];
        for (&id, buf) in chain.iter().zip(bytes.chunks_exact_mut(sector_size)) {
            self.read_sector(id, buf)?;
        }
        bytes.truncate(length);
        Ok(bytes)
    }

    fn load_directory(&mut self) -> Result<(), Error<E>> {
        let chain = self.main_chain(self.header.first_directory_sector.to_ne())?;
        let bytes = self.read_chain(&chain, usize::MAX)?;
        let v3 = self.header.major_version() == 3;
        self.directory = Directory::load(&bytes, v3, self.geometry.mini_cutoff)?;
        self.directory.chain = chain;
        Ok(())
    }

    fn load_minifat(&mut self) -> Result<(), Error<E>> {
        let chain = self.main_chain(self.header.first_mini_fat_sector.to_ne())?;
        let bytes = self.read_chain(&chain, usize::MAX)?;
        let table = AllocationTable::new(from_le_bytes(&bytes));

        let root = self.directory.node(EntryID::ROOT);
        let (start, size) = (root.start, root.size);
        let mut stream_chain = self.main_chain(start)?;
        let needed = Geometry::checked_units(size, self.geometry.sector_size());
        match needed {
            Some(needed) if stream_chain.len() >= needed => stream_chain.truncate(needed),
            _ if self.salvage => warn!("Mini stream chain holds {} sectors for {} bytes", stream_chain.len(), size),
            _ => return Err(CorruptError::ShortStream(0).into()),
        }
        let mut stream = self.read_chain(&stream_chain, size as usize)?;
        let mini_size = self.geometry.mini_sector_size();
        if stream.len() < table.len() * mini_size {
            stream.resize(table.len() * mini_size, 0);
        }
        debug!("Mini stream of {} bytes, {} mini sectors", stream.len(), table.len());
        self.minifat = MiniFat::load(table, stream, chain, stream_chain, mini_size);
        Ok(())
    }

    pub fn version(&self) -> Version {
        Version::from_sector_shift(self.geometry.sector_shift)
    }

    /// Reads one whole sector, a partial last sector of the source is zero padded
    pub fn read_sector(&mut self, id: SectorID, buf: &mut [u8]) -> Result<(), Error<E>> {
        if let Some(bytes) = self.cache.get(&id) {
            buf.copy_from_slice(bytes);
            return Ok(());
        }
        let offset = self.geometry.sector_to_offset(id);
        if offset >= self.source_len {
            return Err(CorruptError::SectorOutOfRange(id.into()).into());
        }
        self.io.wrap_read(offset, buf)
    }

    fn sector_mut(&mut self, id: SectorID) -> Result<&mut Vec<u8>, Error<E>> {
        let bytes = match self.cache.remove(&id) {
            Some(bytes) => bytes,
            None => {
                let mut bytes = alloc::vec![0u8; self.geometry.sector_size()];
                if self.geometry.sector_to_offset(id) < self.source_len {
                    self.read_sector(id, &mut bytes)?;
                }
                bytes
            }
        };
        Ok(self.cache.entry(id).or_insert(bytes))
    }

    fn resize_main(&mut self, chain: &mut Vec<SectorID>, count: usize) {
        for id in chain.iter().skip(count) {
            self.cache.remove(id);
        }
        let appended = self.fat.resize(chain, count);
        for id in appended {
            self.cache.insert(id, alloc::vec![0u8; self.geometry.sector_size()]);
        }
    }

    fn write_main(&mut self, chain: &[SectorID], bytes: &[u8], padding: u8) -> Result<(), Error<E>> {
        let sector_size = self.geometry.sector_size();
        for (index, &id) in chain.iter().enumerate() {
            let start = core::cmp::min(index * sector_size, bytes.len());
            let end = core::cmp::min(start + sector_size, bytes.len());
            let sector = self.sector_mut(id)?;
            sector[..end - start].copy_from_slice(&bytes[start..end]);
            sector[end - start..].fill(padding);
        }
        Ok(())
    }

    /*
     * Stream data
     */

    fn stream_node(&self, id: EntryID) -> Result<&crate::storage::directory::Node, Error<E>> {
        let node = self.directory.node(id);
        match node.object_type {
            ObjectType::Stream => Ok(node),
            ObjectType::Unused => Err(OperationError::NotFound.into()),
            _ => Err(OperationError::NotStream.into()),
        }
    }

    fn unit(&self, mini: bool) -> usize {
        match mini {
            true => self.geometry.mini_sector_size(),
            false => self.geometry.sector_size(),
        }
    }

    /// Resolves the data chain of a stream and checks it covers the declared size
    pub fn ensure_chain(&mut self, id: EntryID) -> Result<(), Error<E>> {
        let node = self.stream_node(id)?;
        if node.chain.is_some() {
            return Ok(());
        }
        let (start, size, mini) = (node.start, node.size, node.in_mini);
        if size == 0 {
            self.release_dangling(id, start, mini);
            let node = self.directory.node_mut(id);
            node.start = END_OF_CHAIN;
            node.chain = Some(Vec::new());
            return Ok(());
        }
        let table = if mini { &self.minifat.table } else { &self.fat.table };
        let mut chain = match self.salvage {
            true => table.salvage_chain(start),
            false => table.chain(start)?,
        };
        let unit = self.unit(mini);
        let node = self.directory.node_mut(id);
        match Geometry::checked_units(size, unit) {
            Some(needed) if chain.len() >= needed => {
                if chain.len() > needed {
                    trace!("Stream {} chain has {} spare sectors", id, chain.len() - needed);
                    chain.truncate(needed);
                }
            }
            _ if self.salvage => {
                warn!("Stream {} truncated to {} bytes", id, chain.len() * unit);
                node.size = (chain.len() * unit) as u64;
            }
            _ => return Err(CorruptError::ShortStream(id.into()).into()),
        }
        node.chain = Some(chain);
        Ok(())
    }

    /// Frees the sectors an empty stream still points at
    fn release_dangling(&mut self, id: EntryID, start: u32, mini: bool) {
        let table = if mini { &self.minifat.table } else { &self.fat.table };
        let mut chain = match table.chain(start) {
            Ok(chain) => chain,
            Err(e) => {
                warn!("Empty stream {} keeps a broken chain, {}", id, e);
                return;
            }
        };
        if chain.is_empty() {
            return;
        }
        debug!("Empty stream {} releases {} sectors", id, chain.len());
        if mini {
            self.minifat.resize(&mut chain, 0);
        } else {
            self.resize_main(&mut chain, 0);
        }
    }

    fn read_units(
        &mut self,
        id: EntryID,
        chain: &[SectorID],
        mini: bool,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<(), Error<E>> {
        let unit = self.unit(mini);
        let mut scratch = alloc::vec![0u8; if mini { 0 } else { unit }];
        let mut done = 0;
        while done < buf.len() {
            let position = offset + done as u64;
            let within = (position % unit as u64) as usize;
            let length = core::cmp::min(unit - within, buf.len() - done);
            let index = (position / unit as u64) as usize;
            let sector = *chain.get(index).ok_or(CorruptError::ShortStream(id.into()))?;
            let target = &mut buf[done..done + length];
            if mini {
                let start = self.minifat.offset(sector) + within;
                let bytes = self.minifat.stream.get(start..start + length);
                target.copy_from_slice(bytes.ok_or(CorruptError::SectorOutOfRange(sector.into()))?);
            } else {
                self.read_sector(sector, &mut scratch)?;
                target.copy_from_slice(&scratch[within..within + length]);
            }
            done += length;
        }
        Ok(())
    }

    fn write_units(
        &mut self,
        id: EntryID,
        chain: &[SectorID],
        mini: bool,
        offset: u64,
        data: &[u8],
    ) -> Result<(), Error<E>> {
        let unit = self.unit(mini);
        let mut done = 0;
        while done < data.len() {
            let position = offset + done as u64;
            let within = (position % unit as u64) as usize;
            let length = core::cmp::min(unit - within, data.len() - done);
            let index = (position / unit as u64) as usize;
            let sector = *chain.get(index).ok_or(CorruptError::ShortStream(id.into()))?;
            let source = &data[done..done + length];
            if mini {
                let start = self.minifat.offset(sector) + within;
                self.minifat.stream[start..start + length].copy_from_slice(source);
            } else {
                self.sector_mut(sector)?[within..within + length].copy_from_slice(source);
            }
            done += length;
        }
        Ok(())
    }

    /// Grows the chain to hold `end` bytes, zero fills `[size, offset)` then writes `data`
    fn write_chain(
        &mut self,
        id: EntryID,
        chain: &mut Vec<SectorID>,
        mini: bool,
        size: u64,
        offset: u64,
        data: &[u8],
    ) -> Result<u64, Error<E>> {
        let unit = self.unit(mini);
        let new_size = core::cmp::max(size, offset + data.len() as u64);
        let count = Geometry::units(new_size, unit);
        if mini {
            self.minifat.resize(chain, count);
        } else {
            self.resize_main(chain, count);
        }
        let zeros = alloc::vec![0u8; unit];
        let mut position = size;
        while position < offset {
            let length = core::cmp::min(unit as u64, offset - position) as usize;
            self.write_units(id, chain, mini, position, &zeros[..length])?;
            position += length as u64;
        }
        self.write_units(id, chain, mini, offset, data)?;
        Ok(new_size)
    }

    fn set_chain(&mut self, id: EntryID, chain: Vec<SectorID>, size: u64, mini: bool) {
        let node = self.directory.node_mut(id);
        node.start = chain.first().map(|&id| id.into()).unwrap_or(END_OF_CHAIN);
        node.chain = Some(chain);
        node.size = size;
        node.in_mini = mini;
    }

    pub fn read_at(&mut self, id: EntryID, offset: u64, buf: &mut [u8]) -> Result<(), Error<E>> {
        let size = self.stream_node(id)?.size;
        if offset.checked_add(buf.len() as u64).map_or(true, |end| end > size) {
            return Err(OperationError::OutOfBounds { offset, length: buf.len(), size }.into());
        }
        self.ensure_chain(id)?;
        let node = self.directory.node_mut(id);
        let mini = node.in_mini;
        let chain = node.chain.take().unwrap_or_default();
        let result = self.read_units(id, &chain, mini, offset, buf);
        self.directory.node_mut(id).chain = Some(chain);
        result
    }

    /// Moves a mini stream that reached the cutoff into the main FAT
    fn promote(&mut self, id: EntryID) -> Result<(), Error<E>> {
        let size = self.stream_node(id)?.size;
        let mut content = alloc::vec![0u8; size as usize];
        self.read_at(id, 0, &mut content)?;
        let mut chain = self.directory.node_mut(id).chain.take().unwrap_or_default();
        self.minifat.resize(&mut chain, 0);
        let result = self.write_chain(id, &mut chain, false, 0, 0, &content);
        self.set_chain(id, chain, size, false);
        result?;
        trace!("Stream {} moved to the main FAT", id);
        Ok(())
    }

    /// Moves a main FAT stream below the cutoff into the mini stream
    fn demote(&mut self, id: EntryID) -> Result<(), Error<E>> {
        let size = self.stream_node(id)?.size;
        let mut content = alloc::vec![0u8; size as usize];
        self.read_at(id, 0, &mut content)?;
        let mut chain = self.directory.node_mut(id).chain.take().unwrap_or_default();
        self.resize_main(&mut chain, 0);
        let result = self.write_chain(id, &mut chain, true, 0, 0, &content);
        self.set_chain(id, chain, size, true);
        result?;
        trace!("Stream {} moved to the mini stream", id);
        Ok(())
    }

    pub fn write_at(&mut self, id: EntryID, offset: u64, data: &[u8]) -> Result<(), Error<E>> {
        self.ensure_chain(id)?;
        if data.is_empty() {
            return Ok(());
        }
        let end = offset.checked_add(data.len() as u64).ok_or(InputError::SeekPosition)?;
        let node = self.stream_node(id)?;
        let (size, in_mini) = (node.size, node.in_mini);
        let new_size = core::cmp::max(size, end);
        let mini = match size {
            0 => self.geometry.is_mini(new_size),
            _ if in_mini && !self.geometry.is_mini(new_size) => {
                self.promote(id)?;
                false
            }
            _ => in_mini,
        };
        let mut chain = self.directory.node_mut(id).chain.take().unwrap_or_default();
        let result = self.write_chain(id, &mut chain, mini, size, offset, data);
        let written = *result.as_ref().unwrap_or(&size);
        self.set_chain(id, chain, written, mini);
        result.map(|_| ())
    }

    /// Shrinks a stream, trailing sectors are released
    pub fn truncate(&mut self, id: EntryID, size: u64) -> Result<(), Error<E>> {
        self.ensure_chain(id)?;
        let node = self.stream_node(id)?;
        if size > node.size {
            return Err(InputError::Size.into());
        }
        let mini = node.in_mini;
        let mut chain = self.directory.node_mut(id).chain.take().unwrap_or_default();
        let count = Geometry::units(size, self.unit(mini));
        if mini {
            self.minifat.resize(&mut chain, count);
        } else {
            self.resize_main(&mut chain, count);
        }
        self.set_chain(id, chain, size, mini);
        Ok(())
    }

    /*
     * Tree operations
     */

    pub fn lookup(&self, parent: EntryID, path: &[&str]) -> Result<EntryID, Error<E>> {
        let mut current = parent;
        for component in path {
            let name = EntryName::new(component)?;
            current = self.directory.find(current, &name).ok_or(OperationError::NotFound)?;
        }
        Ok(current)
    }

    pub fn add_child(&mut self, parent: EntryID, name: &str, object_type: ObjectType) -> Result<EntryID, Error<E>> {
        let name = EntryName::new(name)?;
        Ok(self.directory.add_child(parent, name, object_type)?)
    }

    pub fn remove(&mut self, id: EntryID) -> Result<(), Error<E>> {
        if self.opened.contains(id) {
            return Err(OperationError::AlreadyOpen.into());
        }
        match self.directory.node(id).object_type {
            ObjectType::Unused => return Err(OperationError::NotFound.into()),
            ObjectType::Stream => self.ensure_chain(id)?,
            _ => (),
        }
        let node = self.directory.remove(id)?;
        let mut chain = node.chain.unwrap_or_default();
        if node.in_mini {
            self.minifat.resize(&mut chain, 0);
        } else {
            self.resize_main(&mut chain, 0);
        }
        debug!("Removed {}", node.name);
        Ok(())
    }

    /*
     * Persistence
     */

    /// Writes mini stream, mini FAT and directory into their chains, returns the header to persist
    fn flush_tables(&mut self) -> Result<Header, Error<E>> {
        let cutoff = self.geometry.mini_cutoff as u64;
        let ids: Vec<EntryID> = self.directory.ids().collect();
        for id in ids {
            let node = self.directory.node(id);
            if node.object_type == ObjectType::Stream && !node.in_mini && node.size < cutoff {
                self.demote(id)?;
            }
        }

        let sector_size = self.geometry.sector_size();
        let minifat_bytes = self.minifat.compact();
        let stream = core::mem::take(&mut self.minifat.stream);
        let mut stream_chain = core::mem::take(&mut self.minifat.stream_chain);
        self.resize_main(&mut stream_chain, Geometry::units(stream.len() as u64, sector_size));
        let result = self.write_main(&stream_chain, &stream, 0);
        let root = self.directory.node_mut(EntryID::ROOT);
        root.start = stream_chain.first().map(|&id| id.into()).unwrap_or(END_OF_CHAIN);
        root.size = stream.len() as u64;
        self.minifat.stream = stream;
        self.minifat.stream_chain = stream_chain;
        result?;

        let mut minifat_chain = core::mem::take(&mut self.minifat.chain);
        self.resize_main(&mut minifat_chain, Geometry::units(minifat_bytes.len() as u64, sector_size));
        let result = self.write_main(&minifat_chain, &minifat_bytes, 0xFF);
        self.minifat.chain = minifat_chain;
        result?;

        let directory_bytes = self.directory.serialize(sector_size / crate::region::directory::ENTRY_SIZE);
        let mut directory_chain = core::mem::take(&mut self.directory.chain);
        self.resize_main(&mut directory_chain, directory_bytes.len() / sector_size);
        let result = self.write_main(&directory_chain, &directory_bytes, 0);
        self.directory.chain = directory_chain;
        result?;

        let layout = &self.fat.layout;
        let (inline, _) = difat::serialize(layout, sector_size);
        let first = |chain: &[SectorID]| chain.first().map(|&id| u32::from(id)).unwrap_or(END_OF_CHAIN);
        let mut header = self.header;
        header.num_fat_sectors = (layout.fat_sectors.len() as u32).into();
        header.first_directory_sector = first(&self.directory.chain).into();
        let num_directory_sectors = match self.header.major_version() {
            3 => 0,
            _ => self.directory.chain.len() as u32,
        };
        header.num_directory_sectors = num_directory_sectors.into();
        header.first_mini_fat_sector = first(&self.minifat.chain).into();
        header.num_mini_fat_sectors = (self.minifat.chain.len() as u32).into();
        header.first_difat_sector = first(&layout.difat_sectors).into();
        header.num_difat_sectors = (layout.difat_sectors.len() as u32).into();
        header.difat = inline.map(LE::<u32>::from);
        Ok(header)
    }

    /// Assembles the complete container image
    fn image(&mut self, header: &Header) -> Result<Vec<u8>, Error<E>> {
        let sector_size = self.geometry.sector_size();
        let (_, difat_sectors) = difat::serialize(&self.fat.layout, sector_size);
        let mut roles = BTreeMap::new();
        for (index, &id) in self.fat.layout.fat_sectors.iter().enumerate() {
            roles.insert(id, Role::Fat(index));
        }
        for (index, &id) in self.fat.layout.difat_sectors.iter().enumerate() {
            roles.insert(id, Role::Difat(index));
        }

        let count = self.fat.sector_count();
        let header_size = self.geometry.header_size() as usize;
        let mut image = alloc::vec![0u8; header_size + count * sector_size];
        image[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        for index in 0..count {
            let id = SectorID::from(index as u32);
            let offset = header_size + index * sector_size;
            let target = &mut image[offset..offset + sector_size];
            match roles.get(&id) {
                Some(Role::Fat(nth)) => target.copy_from_slice(&self.fat.fat_sector_bytes(*nth)),
                Some(Role::Difat(nth)) => target.copy_from_slice(&difat_sectors[*nth]),
                None if self.fat.table.get(id) == Some(FREE) => (),
                None if self.cache.contains_key(&id) => self.read_sector(id, target)?,
                None if self.geometry.sector_to_offset(id) < self.source_len => self.read_sector(id, target)?,
                // Allocated but never written
                None => (),
            }
        }
        Ok(image)
    }

    /// Persists the in-memory state as one atomic commit
    pub fn save(&mut self) -> Result<(), Error<E>> {
        let header = self.flush_tables()?;
        let image = self.image(&header)?;
        self.io.wrap_commit(&image)?;
        debug!(
            "Saved {} bytes, {} FAT sectors, {} directory sectors",
            image.len(),
            self.fat.layout.fat_sectors.len(),
            self.directory.chain.len()
        );
        self.header = header;
        self.source_len = image.len() as u64;
        self.cache.clear();
        Ok(())
    }

    pub fn into_inner(self) -> IO {
        self.io
    }
}

/// Error-mapping shorthands for an owned IO
trait OwnedIO<E> {
    fn wrap_read(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), Error<E>>;
    fn wrap_commit(&mut self, image: &[u8]) -> Result<(), Error<E>>;
}

impl<E, T: IO<Error = E>> OwnedIO<E> for T {
    fn wrap_read(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), Error<E>> {
        self.wrap().read_padded(offset, buf).map(|_| ())
    }

    fn wrap_commit(&mut self, image: &[u8]) -> Result<(), Error<E>> {
        self.wrap().commit(image)
    }
}
