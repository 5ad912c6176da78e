// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The object table (component B): two maps keyed by 20-byte identifier,
//! `open` and `sealed`, with entries moving between them only through the
//! seal transition (spec.md invariants 1 and 2).

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime};

use store_protocol::ObjectId;

use crate::arena::{ArenaPtr, Handle};
use crate::error::Error;

/// Per-object metadata (spec.md §3). `construction_duration` starts at
/// zero and is filled in at seal time, once the true construction interval
/// (create → seal) is known.
#[derive(Debug, Clone, Copy)]
pub struct ObjectInfo {
    pub data_size: u64,
    pub metadata_size: u64,
    pub create_time: SystemTime,
    pub construction_duration: Duration,
}

/// An object-table entry: identifier, metadata, and the arena allocation
/// backing its bytes.
pub struct ObjectEntry {
    pub id: ObjectId,
    pub info: ObjectInfo,
    pub ptr: ArenaPtr,
    pub handle: Handle,

    /// When this entry moved into `open`, used to compute
    /// `construction_duration` at seal time. Not exposed on the wire.
    created_at: Instant,
}

pub struct ObjectTable {
    open: HashMap<ObjectId, ObjectEntry>,
    sealed: HashMap<ObjectId, ObjectEntry>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self {
            open: HashMap::new(),
            sealed: HashMap::new(),
        }
    }

    /// SUBSCRIBE's precondition (spec.md §4.D): a subscriber must attach
    /// before any object activity, since past seals are never replayed.
    pub fn check_empty_for_subscribe(&self) -> Result<(), Error> {
        if self.open.is_empty() && self.sealed.is_empty() {
            Ok(())
        } else {
            Err(Error::SubscribeAfterActivity)
        }
    }

    pub fn find_open(&self, id: &ObjectId) -> Option<&ObjectEntry> {
        self.open.get(id)
    }

    pub fn find_sealed(&self, id: &ObjectId) -> Option<&ObjectEntry> {
        self.sealed.get(id)
    }

    /// Insert a newly allocated, not-yet-sealed entry. Fails if `id` is
    /// already live in either map — the "cannot create twice" rule
    /// (spec.md §4.B), which the caller is expected to treat as fatal.
    pub fn insert_open(
        &mut self,
        id: ObjectId,
        ptr: ArenaPtr,
        handle: Handle,
        data_size: u64,
        metadata_size: u64,
    ) -> Result<(), Error> {
        if self.open.contains_key(&id) || self.sealed.contains_key(&id) {
            return Err(Error::AlreadyExists);
        }

        let entry = ObjectEntry {
            id,
            info: ObjectInfo {
                data_size,
                metadata_size,
                create_time: SystemTime::now(),
                construction_duration: Duration::ZERO,
            },
            ptr,
            handle,
            created_at: Instant::now(),
        };

        self.open.insert(id, entry);
        Ok(())
    }

    /// Move `id` from `open` to `sealed`, filling in its construction
    /// duration. A no-op (returns `None`) if `id` is not currently open,
    /// per spec.md's "SEAL of a non-open identifier is silently ignored".
    pub fn seal(&mut self, id: &ObjectId) -> Option<&ObjectEntry> {
        let mut entry = self.open.remove(id)?;
        entry.info.construction_duration = entry.created_at.elapsed();
        self.sealed.insert(*id, entry);
        self.sealed.get(id)
    }

    /// Remove and return a sealed entry so the caller can free its arena
    /// allocation. Fails if `id` is not sealed (covers both "never
    /// existed" and "still open") — deleting an unsealed identifier is a
    /// fatal error per spec.md §4.E.
    pub fn remove_sealed(&mut self, id: &ObjectId) -> Result<ObjectEntry, Error> {
        self.sealed.remove(id).ok_or(Error::NotSealed)
    }
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{Arena, MmapArena};

    fn alloc(arena: &mut MmapArena, n: u64) -> (ArenaPtr, Handle) {
        let ptr = arena.alloc(n).unwrap();
        let handle = arena.describe(&ptr);
        (ptr, handle)
    }

    #[test]
    fn create_then_seal_moves_between_maps() {
        let mut arena = MmapArena::new();
        let mut table = ObjectTable::new();
        let id = [1u8; 20];

        let (ptr, handle) = alloc(&mut arena, 8);
        table.insert_open(id, ptr, handle, 8, 0).unwrap();

        assert!(table.find_open(&id).is_some());
        assert!(table.find_sealed(&id).is_none());

        table.seal(&id).unwrap();

        assert!(table.find_open(&id).is_none());
        assert!(table.find_sealed(&id).is_some());
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let mut arena = MmapArena::new();
        let mut table = ObjectTable::new();
        let id = [2u8; 20];

        let (ptr, handle) = alloc(&mut arena, 8);
        table.insert_open(id, ptr, handle, 8, 0).unwrap();

        let (ptr2, handle2) = alloc(&mut arena, 8);
        let err = table.insert_open(id, ptr2, handle2, 8, 0).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists));
    }

    #[test]
    fn seal_of_unknown_id_is_a_no_op() {
        let mut table = ObjectTable::new();
        assert!(table.seal(&[3u8; 20]).is_none());
    }

    #[test]
    fn delete_requires_sealed() {
        let mut arena = MmapArena::new();
        let mut table = ObjectTable::new();
        let id = [4u8; 20];

        let (ptr, handle) = alloc(&mut arena, 8);
        table.insert_open(id, ptr, handle, 8, 0).unwrap();

        let err = table.remove_sealed(&id).unwrap_err();
        assert!(matches!(err, Error::NotSealed));

        table.seal(&id).unwrap();
        assert!(table.remove_sealed(&id).is_ok());
    }
}
