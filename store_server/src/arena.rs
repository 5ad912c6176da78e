// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The shared-memory arena allocator (component A).
//!
//! spec.md treats the allocator's internal mechanics as an external
//! contract and only requires that every live allocation can be described
//! as `(fd, map_size, offset)`. `Arena` is that contract, expressed as a
//! trait per the re-architecture note in spec.md §9 ("model it as a
//! trait/interface with `alloc`, `free`, `describe`"); `MmapArena` is the
//! concrete implementation a complete crate needs to actually build and
//! test against.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::PathBuf;

use nix::fcntl::{open, OFlag};
use nix::sys::memfd::{memfd_create, MFdFlags};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;

/// A handle sufficient for a peer to `mmap` and locate the exact bytes of
/// an allocation.
#[derive(Debug, Clone, Copy)]
pub struct Handle {
    pub fd: RawFd,
    pub map_size: u64,
    pub offset: u64,
}

/// An allocation returned by `Arena::alloc`. Dropping it does not free the
/// backing memory on its own — ownership of that lifecycle belongs to the
/// object table (spec.md invariant 6: release only via
/// "entry removed from sealed → arena free → entry freed").
pub struct ArenaPtr {
    fd: OwnedFd,
    len: u64,
}

impl ArenaPtr {
    pub fn len(&self) -> u64 {
        self.len
    }
}

/// The allocator contract the store core depends on. `alloc`/`free`/
/// `describe` are the only operations the core calls.
pub trait Arena {
    fn alloc(&mut self, n_bytes: u64) -> std::io::Result<ArenaPtr>;
    fn free(&mut self, ptr: ArenaPtr);
    fn describe(&self, ptr: &ArenaPtr) -> Handle;
}

/// Backs each allocation with its own anonymous `memfd`, sized exactly to
/// the request. spec.md permits the allocator to back allocations with
/// multiple mappings and says the core never assumes a single fd for the
/// whole arena; one `memfd` per object is the simplest design that
/// satisfies that (in the spirit of Arrow Plasma's per-object regions)
/// without requiring a real sub-allocator over one big mapping.
pub struct MmapArena {
    next_id: u64,
    /// When set (`--arena-file <dir>`), allocations are backed by an
    /// unlinked file created with `O_TMPFILE` under this directory instead
    /// of an anonymous `memfd`. Useful on systems where `memfd_create` is
    /// unavailable or where the operator wants allocations visible in a
    /// particular filesystem (e.g. a `tmpfs` mount sized for the store).
    backing_dir: Option<PathBuf>,
}

impl MmapArena {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            backing_dir: None,
        }
    }

    /// Back every allocation with an `O_TMPFILE` under `dir` instead of an
    /// anonymous `memfd`.
    pub fn with_backing_dir(dir: PathBuf) -> Self {
        Self {
            next_id: 0,
            backing_dir: Some(dir),
        }
    }

    fn create_fd(&mut self, n_bytes: u64) -> std::io::Result<OwnedFd> {
        self.next_id += 1;

        match &self.backing_dir {
            Some(dir) => {
                let fd = open(
                    dir.as_path(),
                    OFlag::O_TMPFILE | OFlag::O_RDWR,
                    Mode::S_IRUSR | Mode::S_IWUSR,
                )?;
                ftruncate(&fd, n_bytes.max(1) as i64)?;
                Ok(fd)
            }
            None => {
                let name = format!("shmstore-{}", self.next_id);
                let fd = memfd_create(name.as_str(), MFdFlags::empty())?;
                ftruncate(&fd, n_bytes.max(1) as i64)?;
                Ok(fd)
            }
        }
    }
}

impl Default for MmapArena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena for MmapArena {
    fn alloc(&mut self, n_bytes: u64) -> std::io::Result<ArenaPtr> {
        // A zero-byte object is valid (spec.md §8 boundary behavior); give
        // it a minimal one-byte backing so `mmap` at the peer still has
        // something to map.
        let fd = self.create_fd(n_bytes)?;
        Ok(ArenaPtr { fd, len: n_bytes })
    }

    fn free(&mut self, ptr: ArenaPtr) {
        // Dropping the OwnedFd closes it; once every peer that `mmap`ped
        // it has also dropped its reference, the kernel reclaims the pages.
        drop(ptr);
    }

    fn describe(&self, ptr: &ArenaPtr) -> Handle {
        Handle {
            fd: ptr.fd.as_raw_fd(),
            map_size: ptr.len.max(1),
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_describes_a_handle_that_fits_the_request() {
        let mut arena = MmapArena::new();
        let ptr = arena.alloc(64).unwrap();
        let handle = arena.describe(&ptr);

        assert!(handle.fd >= 0);
        assert!(handle.map_size >= 64);
        assert_eq!(handle.offset, 0);
    }

    #[test]
    fn zero_byte_alloc_still_produces_a_valid_handle() {
        let mut arena = MmapArena::new();
        let ptr = arena.alloc(0).unwrap();
        let handle = arena.describe(&ptr);

        assert!(handle.fd >= 0);
        assert!(handle.map_size >= 1);
    }
}
