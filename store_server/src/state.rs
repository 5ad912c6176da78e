// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The store's aggregate state: the object table, waiters table,
//! subscriber queues, and the arena, plus the bookkeeping needed to tear a
//! connection down cleanly. Kept as one struct passed by `&mut` to every
//! event-loop callback, per the re-architecture note in spec.md §9
//! ("the store state is a single aggregate passed as context to every
//! event-loop callback — keep that shape; do not hide it in process-global
//! storage").

use std::collections::HashMap;
use std::os::fd::{OwnedFd, RawFd};

use log::debug;

use crate::arena::Arena;
use crate::event_loop::EventLoop;
use crate::object_table::ObjectTable;
use crate::subscribers::Subscribers;
use crate::waiters::WaitersTable;

/// What a registered, non-listener fd is for. Holding the `OwnedFd` here
/// (rather than a bare `RawFd`) means removing an entry from `conns`
/// closes the descriptor — the explicit teardown spec.md §9 open question
/// 4 asks for, instead of the leak the distilled source has.
pub enum Connection {
    Client(OwnedFd),
    Subscriber(OwnedFd),
}

pub struct Store<A: Arena> {
    pub object_table: ObjectTable,
    pub waiters: WaitersTable,
    pub subscribers: Subscribers,
    pub arena: A,
    pub conns: HashMap<RawFd, Connection>,
}

impl<A: Arena> Store<A> {
    pub fn new(arena: A) -> Self {
        Self {
            object_table: ObjectTable::new(),
            waiters: WaitersTable::new(),
            subscribers: Subscribers::new(),
            arena,
            conns: HashMap::new(),
        }
    }

    /// Tear down everything keyed by `fd`: deregister it from the event
    /// loop, reap any waiter entries referencing it (resolving spec.md §9
    /// open question 1), drop its subscriber queue if it had one
    /// (resolving open question 4), and close the descriptor by dropping
    /// its `Connection`. Used for an explicit DISCONNECT request, an
    /// implicit EOF on a client socket, and a hard I/O failure draining a
    /// subscriber queue — all three are the same teardown.
    pub fn disconnect(&mut self, event_loop: &EventLoop, fd: RawFd) {
        debug!("tearing down connection {fd}");
        let _ = event_loop.remove_fd(fd);
        self.waiters.reap_fd(fd);
        self.subscribers.remove(fd);
        self.conns.remove(&fd);
    }
}
