pub(crate) mod context;
pub(crate) mod directory;
pub mod stream;

use alloc::vec::Vec;
use core::fmt::Debug;

use context::Context;
use directory::Node;
use stream::Stream;

use crate::acquire;
use crate::error::{Error, OperationError};
use crate::name::EntryName;
use crate::region::directory::{Clsid, FileTime, ObjectType};
use crate::sync::Shared;
use crate::types::EntryID;

/// Snapshot of one directory entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryInfo {
    pub id: EntryID,
    pub name: EntryName,
    pub object_type: ObjectType,
    pub size: u64,
    pub clsid: Clsid,
    pub state_bits: u32,
    pub created: FileTime,
    pub modified: FileTime,
}

impl EntryInfo {
    pub(crate) fn new(id: EntryID, node: &Node) -> Self {
        Self {
            id,
            name: node.name.clone(),
            object_type: node.object_type,
            size: node.size,
            clsid: node.clsid,
            state_bits: node.state_bits,
            created: node.created,
            modified: node.modified,
        }
    }

    pub fn is_stream(&self) -> bool {
        self.object_type == ObjectType::Stream
    }

    pub fn is_storage(&self) -> bool {
        matches!(self.object_type, ObjectType::Storage | ObjectType::Root)
    }
}

/// A storage (directory) inside the container, the root storage included.
///
/// The entry cannot be removed while any handle to it is alive.
pub struct Storage<IO> {
    context: Shared<Context<IO>>,
    id: EntryID,
}

impl<IO> Storage<IO> {
    /// Must not be called while the context is acquired
    fn retained(context: Shared<Context<IO>>, id: EntryID) -> Self {
        acquire!(context).opened.retain(id);
        Self { context, id }
    }
}

impl<IO> Clone for Storage<IO> {
    fn clone(&self) -> Self {
        Self::retained(self.context.clone(), self.id)
    }
}

impl<IO> Drop for Storage<IO> {
    fn drop(&mut self) {
        acquire!(self.context).opened.release(self.id);
    }
}

pub(crate) fn open_stream<E: Debug, IO: crate::io::IO<Error = E>>(
    context: &Shared<Context<IO>>,
    id: EntryID,
) -> Result<Stream<IO>, Error<E>> {
    let mut guard = acquire!(context);
    match guard.directory.node(id).object_type {
        ObjectType::Stream => (),
        _ => return Err(OperationError::NotStream.into()),
    }
    guard.ensure_chain(id)?;
    if !guard.opened.add(id) {
        return Err(OperationError::AlreadyOpen.into());
    }
    drop(guard);
    Ok(Stream::new(context.clone(), id))
}

impl<E: Debug, IO: crate::io::IO<Error = E>> Storage<IO> {
    pub(crate) fn new(context: Shared<Context<IO>>, id: EntryID) -> Self {
        Self::retained(context, id)
    }

    pub fn id(&self) -> EntryID {
        self.id
    }

    pub fn info(&self) -> EntryInfo {
        let context = acquire!(self.context);
        EntryInfo::new(self.id, context.directory.node(self.id))
    }

    pub fn set_clsid(&mut self, clsid: Clsid) {
        acquire!(self.context).directory.node_mut(self.id).clsid = clsid;
    }

    pub fn set_state_bits(&mut self, state_bits: u32) {
        acquire!(self.context).directory.node_mut(self.id).state_bits = state_bits;
    }

    pub fn touch(&mut self, modified: FileTime) {
        acquire!(self.context).directory.node_mut(self.id).modified = modified;
    }

    /// Exact, case-sensitive lookup of a direct child
    pub fn find(&self, name: &str) -> Result<EntryInfo, Error<E>> {
        let context = acquire!(self.context);
        let id = context.lookup(self.id, &[name])?;
        Ok(EntryInfo::new(id, context.directory.node(id)))
    }

    pub fn exists(&self, name: &str) -> bool {
        acquire!(self.context).lookup(self.id, &[name]).is_ok()
    }

    /// Direct children in directory order
    pub fn entries(&self) -> Vec<EntryInfo> {
        let context = acquire!(self.context);
        let directory = &context.directory;
        let children = directory.node(self.id).children.iter();
        children.map(|&id| EntryInfo::new(id, directory.node(id))).collect()
    }

    pub fn open_stream(&self, name: &str) -> Result<Stream<IO>, Error<E>> {
        let id = acquire!(self.context).lookup(self.id, &[name])?;
        open_stream(&self.context, id)
    }

    pub fn open_storage(&self, name: &str) -> Result<Storage<IO>, Error<E>> {
        let context = acquire!(self.context);
        let id = context.lookup(self.id, &[name])?;
        if !context.directory.node(id).is_storage() {
            return Err(OperationError::NotStorage.into());
        }
        drop(context);
        Ok(Storage::new(self.context.clone(), id))
    }

    pub fn create_stream(&mut self, name: &str) -> Result<Stream<IO>, Error<E>> {
        let id = acquire!(self.context).add_child(self.id, name, ObjectType::Stream)?;
        open_stream(&self.context, id)
    }

    pub fn create_storage(&mut self, name: &str) -> Result<Storage<IO>, Error<E>> {
        let id = acquire!(self.context).add_child(self.id, name, ObjectType::Storage)?;
        Ok(Storage::new(self.context.clone(), id))
    }

    /// Removes a stream or an empty storage without live handles, freeing its sectors
    pub fn remove(&mut self, name: &str) -> Result<(), Error<E>> {
        let mut context = acquire!(self.context);
        let id = context.lookup(self.id, &[name])?;
        context.remove(id)
    }
}
