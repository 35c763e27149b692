#![doc = include_str!("../README.md")]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

#[macro_use]
extern crate hex_literal;
extern crate heapless;
#[macro_use]
extern crate log;

mod allocation;
mod endian;
pub mod error;
pub mod io;
mod name;
mod options;
pub mod record;
mod region;
mod sector;
mod storage;
pub(crate) mod sync;
pub mod types;

use alloc::vec::Vec;
use core::fmt::Debug;

pub use name::{EntryName, MAX_NAME_LENGTH};
pub use options::{OpenOptions, Version};
pub use region::directory::{Clsid, FileTime, ObjectType};
pub use storage::stream::{SeekFrom, Stream};
pub use storage::{EntryInfo, Storage};

use error::{Error, InputError, OperationError};
use region::header::Header;
use storage::context::Context;
use sync::{Shared, shared, unshare};
use types::EntryID;

/// Whether `bytes` start with the compound file signature
pub fn has_signature(bytes: &[u8]) -> bool {
    Header::is_cfb(bytes)
}

/// A compound file container.
///
/// Paths are sequences of entry names starting below the root storage, an
/// empty path denotes the root itself. Changes are kept in memory until
/// `save` commits a complete new image through the IO.
pub struct CompoundFile<IO> {
    context: Shared<Context<IO>>,
}

impl<E: Debug, IO: io::IO<Error = E>> CompoundFile<IO> {
    pub fn open(io: IO) -> Result<Self, Error<E>> {
        Self::open_with(io, OpenOptions::default())
    }

    pub fn open_with(io: IO, options: OpenOptions) -> Result<Self, Error<E>> {
        let context = Context::open(io, options)?;
        Ok(Self { context: shared(context) })
    }

    /// Formats an empty container, nothing is written before `save`
    pub fn create(io: IO, version: Version) -> Self {
        Self { context: shared(Context::create(io, version)) }
    }

    pub fn version(&self) -> Version {
        acquire!(self.context).version()
    }

    pub fn root(&self) -> Storage<IO> {
        Storage::new(self.context.clone(), EntryID::ROOT)
    }

    fn resolve(&self, path: &[&str]) -> Result<EntryID, Error<E>> {
        acquire!(self.context).lookup(EntryID::ROOT, path)
    }

    pub fn entry(&self, path: &[&str]) -> Result<EntryInfo, Error<E>> {
        let id = self.resolve(path)?;
        let context = acquire!(self.context);
        Ok(EntryInfo::new(id, context.directory.node(id)))
    }

    pub fn exists(&self, path: &[&str]) -> bool {
        self.resolve(path).is_ok()
    }

    /// Children of the storage at `path`
    pub fn list_entries(&self, path: &[&str]) -> Result<Vec<EntryInfo>, Error<E>> {
        Ok(self.open_storage(path)?.entries())
    }

    pub fn open_storage(&self, path: &[&str]) -> Result<Storage<IO>, Error<E>> {
        let id = self.resolve(path)?;
        if !acquire!(self.context).directory.node(id).is_storage() {
            return Err(OperationError::NotStorage.into());
        }
        Ok(Storage::new(self.context.clone(), id))
    }

    pub fn open_stream(&self, path: &[&str]) -> Result<Stream<IO>, Error<E>> {
        if path.is_empty() {
            return Err(InputError::EmptyPath.into());
        }
        let id = self.resolve(path)?;
        storage::open_stream(&self.context, id)
    }

    /// Walks `path` from the root, creating storages that do not exist yet
    fn make_storages(&mut self, path: &[&str]) -> Result<EntryID, Error<E>> {
        let mut context = acquire!(self.context);
        let mut current = EntryID::ROOT;
        for &name in path {
            current = match context.lookup(current, &[name]) {
                Ok(id) if context.directory.node(id).is_storage() => id,
                Ok(_) => return Err(OperationError::NotStorage.into()),
                Err(e) if e.is_not_found() => {
                    trace!("Create intermediate storage {}", name);
                    context.add_child(current, name, ObjectType::Storage)?
                }
                Err(e) => return Err(e),
            };
        }
        Ok(current)
    }

    /// Creates an empty stream, missing parent storages are created as well
    pub fn create_stream(&mut self, path: &[&str]) -> Result<Stream<IO>, Error<E>> {
        let (name, parents) = path.split_last().ok_or(Error::Input(InputError::EmptyPath))?;
        let parent = self.make_storages(parents)?;
        let id = acquire!(self.context).add_child(parent, name, ObjectType::Stream)?;
        storage::open_stream(&self.context, id)
    }

    pub fn create_storage(&mut self, path: &[&str]) -> Result<Storage<IO>, Error<E>> {
        let (name, parents) = path.split_last().ok_or(Error::Input(InputError::EmptyPath))?;
        let parent = self.make_storages(parents)?;
        let id = acquire!(self.context).add_child(parent, name, ObjectType::Storage)?;
        Ok(Storage::new(self.context.clone(), id))
    }

    /// Removes a stream or an empty storage, fails while a handle to it is alive
    pub fn remove(&mut self, path: &[&str]) -> Result<(), Error<E>> {
        if path.is_empty() {
            return Err(OperationError::RootEntry.into());
        }
        let id = self.resolve(path)?;
        acquire!(self.context).remove(id)
    }

    /// Commits the in-memory state as one new image
    pub fn save(&mut self) -> Result<(), Error<E>> {
        acquire!(self.context).save()
    }

    /// Gives the IO back, fails while storage or stream handles are still alive
    pub fn try_into_inner(self) -> Result<IO, Self> {
        match unshare(self.context) {
            Ok(context) => Ok(context.into_inner()),
            Err(context) => Err(Self { context }),
        }
    }
}
