// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The waiters table (component C): for each identifier not yet sealed, an
//! ordered sequence of client fds awaiting the delayed GET reply.

use std::collections::HashMap;
use std::os::fd::RawFd;

use store_protocol::ObjectId;

pub struct WaitersTable {
    table: HashMap<ObjectId, Vec<RawFd>>,
}

impl WaitersTable {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Record `fd` as waiting on `id`. A client may appear more than once in
    /// one sequence if it repeats the GET; the dispatcher fans out once
    /// per appearance (spec.md §4.C).
    pub fn add_waiter(&mut self, id: ObjectId, fd: RawFd) {
        self.table.entry(id).or_default().push(fd);
    }

    /// Atomically remove and return the waiter sequence for `id`, in
    /// `add_waiter` order. Absent if there were no waiters.
    pub fn take_waiters(&mut self, id: &ObjectId) -> Vec<RawFd> {
        self.table.remove(id).unwrap_or_default()
    }

    /// Remove every occurrence of `fd` across every pending waiter entry.
    ///
    /// spec.md §9 open question 1 leaves unresolved whether a disconnected
    /// waiter's fd should be reaped or tolerated at send time; this crate
    /// resolves it by reaping eagerly on disconnect (see DESIGN.md), which
    /// keeps a later SEAL from ever attempting a passed-fd send to a
    /// closed descriptor.
    pub fn reap_fd(&mut self, fd: RawFd) {
        self.table.retain(|_, fds| {
            fds.retain(|&f| f != fd);
            !fds.is_empty()
        });
    }
}

impl Default for WaitersTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiters_are_returned_in_add_order() {
        let mut waiters = WaitersTable::new();
        let id = [1u8; 20];

        waiters.add_waiter(id, 10);
        waiters.add_waiter(id, 11);
        waiters.add_waiter(id, 10);

        assert_eq!(waiters.take_waiters(&id), vec![10, 11, 10]);
        assert_eq!(waiters.take_waiters(&id), Vec::<RawFd>::new());
    }

    #[test]
    fn reap_fd_removes_only_the_disconnected_client() {
        let mut waiters = WaitersTable::new();
        let a = [1u8; 20];
        let b = [2u8; 20];

        waiters.add_waiter(a, 10);
        waiters.add_waiter(a, 11);
        waiters.add_waiter(b, 10);

        waiters.reap_fd(10);

        assert_eq!(waiters.take_waiters(&a), vec![11]);
        assert_eq!(waiters.take_waiters(&b), Vec::<RawFd>::new());
    }
}
