use alloc::vec::Vec;

use crate::endian::Little as LE;
use crate::error::{CorruptError, Error, FormatError, OperationError};
use crate::name::EntryName;
use crate::region::directory::{
    Clsid, Color, DirectoryEntry, FileTime, ObjectType, ENTRY_SIZE, NAME_CAPACITY,
};
use crate::region::fat::END_OF_CHAIN;
use crate::sector::Geometry;
use crate::types::{EntryID, SectorID};

/// One directory slot with its tree position resolved into parent and sorted children
#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub name: EntryName,
    pub object_type: ObjectType,
    pub clsid: Clsid,
    pub state_bits: u32,
    pub created: FileTime,
    pub modified: FileTime,
    pub start: u32,
    pub size: u64,
    pub parent: Option<EntryID>,
    pub children: Vec<EntryID>,
    /// Data chain, resolved on first access
    pub chain: Option<Vec<SectorID>>,
    /// Data lives in the mini stream
    pub in_mini: bool,
}

impl Node {
    fn unused() -> Self {
        Self {
            name: EntryName::default(),
            object_type: ObjectType::Unused,
            clsid: Clsid::default(),
            state_bits: 0,
            created: FileTime::default(),
            modified: FileTime::default(),
            start: END_OF_CHAIN,
            size: 0,
            parent: None,
            children: Vec::new(),
            chain: None,
            in_mini: false,
        }
    }

    fn new(name: EntryName, object_type: ObjectType, parent: Option<EntryID>) -> Self {
        let mut node = Self::unused();
        node.name = name;
        node.object_type = object_type;
        node.parent = parent;
        match object_type {
            ObjectType::Storage => {
                node.created = FileTime::now();
                node.modified = node.created;
            }
            ObjectType::Stream => node.chain = Some(Vec::new()),
            _ => (),
        }
        node
    }

    fn parse(entry: &DirectoryEntry, id: u32, v3: bool) -> Result<Self, FormatError> {
        let units = entry.name_units().ok_or(FormatError::DirectoryEntry(id))?;
        let name = EntryName::from_units(&units).ok_or(FormatError::DirectoryEntry(id))?;
        let object_type = entry.object_type().map_err(|_| FormatError::DirectoryEntry(id))?;
        let mut size = entry.size.to_ne();
        if v3 {
            size &= 0xFFFF_FFFF;
        }
        Ok(Self {
            name,
            object_type,
            clsid: Clsid(entry.clsid),
            state_bits: entry.state_bits.to_ne(),
            created: FileTime(entry.created.to_ne()),
            modified: FileTime(entry.modified.to_ne()),
            start: entry.start_sector.to_ne(),
            size,
            parent: None,
            children: Vec::new(),
            chain: None,
            in_mini: false,
        })
    }

    pub fn is_storage(&self) -> bool {
        matches!(self.object_type, ObjectType::Storage | ObjectType::Root)
    }
}

#[derive(Copy, Clone)]
struct Link {
    left: u32,
    right: u32,
    child: u32,
    color: Color,
}

/// The whole directory held in memory, slot index equals EntryID
#[derive(Clone, Debug)]
pub(crate) struct Directory {
    pub nodes: Vec<Node>,
    /// Main FAT chain holding the directory stream
    pub chain: Vec<SectorID>,
}

impl Directory {
    pub fn new() -> Self {
        let name = EntryName::new("Root Entry").unwrap_or_default();
        let root = Node::new(name, ObjectType::Root, None);
        Self { nodes: alloc::vec![root], chain: Vec::new() }
    }

    /// Rebuilds the tree from the raw directory stream.
    ///
    /// Every entry is reachable at most once from the root, unreachable
    /// entries are dropped and their slots become reusable.
    pub fn load<E>(bytes: &[u8], v3: bool, cutoff: u32) -> Result<Self, Error<E>> {
        let raw: Vec<DirectoryEntry> = bytes.chunks_exact(ENTRY_SIZE).map(DirectoryEntry::parse).collect();
        let count = raw.len();
        match raw.first().map(|entry| entry.object_type()) {
            Some(Ok(ObjectType::Root)) => (),
            _ => return Err(FormatError::RootMissing.into()),
        }
        let mut nodes: Vec<Node> = (0..count).map(|_| Node::unused()).collect();
        nodes[0] = Node::parse(&raw[0], 0, v3)?;
        let mut visited = alloc::vec![false; count];
        visited[0] = true;

        let mut stack = alloc::vec![(raw[0].child.to_ne(), EntryID::ROOT)];
        while let Some((link, parent)) = stack.pop() {
            let id = match EntryID::from_raw(link) {
                Some(id) => id,
                None => continue,
            };
            if id.index() >= count {
                return Err(CorruptError::DirectoryLink(link).into());
            }
            if visited[id.index()] {
                return Err(CorruptError::DirectoryCycle(link).into());
            }
            visited[id.index()] = true;
            let entry = &raw[id.index()];
            let mut node = Node::parse(entry, link, v3)?;
            match node.object_type {
                ObjectType::Storage => stack.push((entry.child.to_ne(), id)),
                ObjectType::Stream => {
                    node.in_mini = node.size < cutoff as u64;
                    if entry.child.to_ne() != EntryID::NONE {
                        warn!("Stream entry {} has children, ignored", id);
                    }
                }
                _ => return Err(FormatError::DirectoryEntry(link).into()),
            }
            node.parent = Some(parent);
            nodes[parent.index()].children.push(id);
            nodes[id.index()] = node;
            stack.push((entry.left.to_ne(), parent));
            stack.push((entry.right.to_ne(), parent));
        }

        for (index, entry) in raw.iter().enumerate() {
            if !visited[index] && entry.object_type() != Ok(ObjectType::Unused) {
                warn!("Directory entry {} is unreachable, slot released", index);
            }
        }
        let mut directory = Self { nodes, chain: Vec::new() };
        for index in 0..count {
            directory.sort_children(EntryID::from(index as u32));
        }
        debug!("Directory loaded with {} slots", count);
        Ok(directory)
    }

    fn sort_children(&mut self, id: EntryID) {
        let mut children = core::mem::take(&mut self.nodes[id.index()].children);
        children.sort_by(|a, b| self.nodes[a.index()].name.cfb_cmp(&self.nodes[b.index()].name));
        self.nodes[id.index()].children = children;
    }

    pub fn node(&self, id: EntryID) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: EntryID) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn ids(&self) -> impl Iterator<Item = EntryID> + '_ {
        let used = self.nodes.iter().enumerate();
        let used = used.filter(|(_, node)| node.object_type != ObjectType::Unused);
        used.map(|(index, _)| EntryID::from(index as u32))
    }

    /// Exact, case-sensitive lookup among the children of `parent`
    pub fn find(&self, parent: EntryID, name: &EntryName) -> Option<EntryID> {
        let children = &self.node(parent).children;
        children.iter().copied().find(|&id| self.node(id).name == *name)
    }

    pub fn add_child(
        &mut self,
        parent: EntryID,
        name: EntryName,
        object_type: ObjectType,
    ) -> Result<EntryID, OperationError> {
        if !self.node(parent).is_storage() {
            return Err(OperationError::NotStorage);
        }
        let children = &self.node(parent).children;
        let position = children.binary_search_by(|&id| self.node(id).name.cfb_cmp(&name));
        let position = match position {
            Ok(_) => return Err(OperationError::AlreadyExists),
            Err(position) => position,
        };
        let node = Node::new(name, object_type, Some(parent));
        let slot = self.nodes.iter().skip(1).position(|node| node.object_type == ObjectType::Unused);
        let id = match slot {
            Some(index) => {
                self.nodes[index + 1] = node;
                EntryID::from(index as u32 + 1)
            }
            None => {
                self.nodes.push(node);
                EntryID::from(self.nodes.len() as u32 - 1)
            }
        };
        self.node_mut(parent).children.insert(position, id);
        trace!("Entry {} added under {}", id, parent);
        Ok(id)
    }

    /// Detaches an empty entry and releases its slot, returns what it held
    pub fn remove(&mut self, id: EntryID) -> Result<Node, OperationError> {
        if id == EntryID::ROOT {
            return Err(OperationError::RootEntry);
        }
        let node = self.node(id);
        if !node.children.is_empty() {
            return Err(OperationError::NotEmpty);
        }
        if let Some(parent) = node.parent {
            self.node_mut(parent).children.retain(|&child| child != id);
        }
        trace!("Entry {} removed", id);
        Ok(core::mem::replace(self.node_mut(id), Node::unused()))
    }

    fn balance(&self, ids: &[EntryID], depth: u32, red_depth: Option<u32>, links: &mut [Link]) -> u32 {
        if ids.is_empty() {
            return EntryID::NONE;
        }
        let middle = ids.len() / 2;
        let id = ids[middle];
        let left = self.balance(&ids[..middle], depth + 1, red_depth, links);
        let right = self.balance(&ids[middle + 1..], depth + 1, red_depth, links);
        let link = &mut links[id.index()];
        link.left = left;
        link.right = right;
        link.color = if red_depth == Some(depth) { Color::Red } else { Color::Black };
        id.into()
    }

    /// Serializes every slot, children of each storage form a balanced red-black tree
    pub fn serialize(&self, entries_per_sector: usize) -> Vec<u8> {
        let none = Link { left: EntryID::NONE, right: EntryID::NONE, child: EntryID::NONE, color: Color::Black };
        let mut links = alloc::vec![none; self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            let count = node.children.len();
            if count == 0 {
                continue;
            }
            let perfect = (count + 1).is_power_of_two();
            let red_depth = if perfect { None } else { Some(count.ilog2()) };
            links[index].child = self.balance(&node.children, 0, red_depth, &mut links);
        }

        let slots = Geometry::units(self.nodes.len() as u64, entries_per_sector) * entries_per_sector;
        let mut bytes = Vec::with_capacity(slots * ENTRY_SIZE);
        for (node, link) in self.nodes.iter().zip(links.iter()) {
            let entry = match node.object_type {
                ObjectType::Unused => DirectoryEntry::default(),
                _ => Self::to_entry(node, link),
            };
            bytes.extend_from_slice(&entry.to_bytes());
        }
        for _ in self.nodes.len()..slots {
            bytes.extend_from_slice(&DirectoryEntry::default().to_bytes());
        }
        bytes
    }

    fn to_entry(node: &Node, link: &Link) -> DirectoryEntry {
        let mut name = [LE::default(); NAME_CAPACITY];
        for (slot, &unit) in name.iter_mut().zip(node.name.units()) {
            *slot = unit.into();
        }
        let name_length = (node.name.units().len() as u16 + 1) * 2;
        DirectoryEntry {
            name,
            name_length: name_length.into(),
            object_type: node.object_type.into(),
            color: link.color.into(),
            left: link.left.into(),
            right: link.right.into(),
            child: link.child.into(),
            clsid: node.clsid.0,
            state_bits: node.state_bits.into(),
            created: node.created.0.into(),
            modified: node.modified.0.into(),
            start_sector: node.start.into(),
            size: node.size.into(),
        }
    }
}
