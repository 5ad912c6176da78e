// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Event-loop glue (component G): the thin `epoll(7)` wrapper the core
//! registers and deregisters fds against. spec.md treats the event-loop
//! primitive itself as an external collaborator ("poll/epoll/kqueue
//! wrapper") and only specifies the narrow contract the core calls through:
//! `add_fd`/`remove_fd`/`run`.
//!
//! One iteration of `run`'s caller processes one event; callbacks are not
//! invoked here at all — `run` (really, `wait`) just hands back the ready
//! fds and their readiness, and the caller (the main loop in
//! `bin/store_server.rs`) dispatches each one to component E/F/D as
//! appropriate. That keeps this module ignorant of `Store`, matching the
//! teacher's separation between the io_uring submission/completion glue
//! (`server/ring.rs`) and the RPC dispatch it drives.

use std::os::fd::{BorrowedFd, RawFd};

use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};

/// Epoll's registration calls want `impl AsFd`; everything this module
/// registers is a `RawFd` owned elsewhere (by the connection/arena tables),
/// so borrow it for the duration of the syscall rather than taking
/// ownership.
///
/// SAFETY: the caller guarantees `fd` names an fd that outlives the
/// borrow, i.e. it is not closed between being passed in and the syscall
/// returning.
unsafe fn borrow(fd: RawFd) -> BorrowedFd<'static> {
    unsafe { BorrowedFd::borrow_raw(fd) }
}

/// Which readiness a registration cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

impl Interest {
    fn flags(self) -> EpollFlags {
        match self {
            Interest::Read => EpollFlags::EPOLLIN,
            Interest::Write => EpollFlags::EPOLLOUT,
        }
    }
}

/// One ready fd, and whether it was ready to read, write, or (rarely) both.
#[derive(Debug, Clone, Copy)]
pub struct Ready {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
}

pub struct EventLoop {
    epoll: Epoll,
    /// How long `wait` blocks before returning with no events, so the main
    /// loop gets a chance to notice `SIGTERM` even with no I/O pending.
    poll_timeout: EpollTimeout,
}

impl EventLoop {
    pub fn new() -> std::io::Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::empty())?;
        Ok(Self {
            epoll,
            poll_timeout: EpollTimeout::try_from(250u16).unwrap(),
        })
    }

    pub fn add_fd(&self, fd: RawFd, interest: Interest) -> std::io::Result<()> {
        let event = EpollEvent::new(interest.flags(), fd as u64);
        // SAFETY: see `borrow`; the caller owns `fd` and keeps it open.
        self.epoll.add(unsafe { borrow(fd) }, event)?;
        Ok(())
    }

    pub fn remove_fd(&self, fd: RawFd) -> std::io::Result<()> {
        // SAFETY: see `borrow`; the caller owns `fd` and keeps it open.
        self.epoll.delete(unsafe { borrow(fd) })?;
        Ok(())
    }

    /// Block until at least one registered fd is ready, or the poll
    /// timeout elapses, and return the ready set. An `EINTR` from a
    /// delivered signal is treated as "no events this round" rather than
    /// propagated, since the main loop's shutdown flag is what actually
    /// needs checking on that wakeup.
    pub fn wait(&self) -> std::io::Result<Vec<Ready>> {
        let mut events = [EpollEvent::empty(); 256];

        let n = match self.epoll.wait(&mut events, self.poll_timeout) {
            Ok(n) => n,
            Err(nix::Error::EINTR) => 0,
            Err(e) => return Err(e.into()),
        };

        Ok(events[..n]
            .iter()
            .map(|ev| {
                let flags = ev.events();
                Ready {
                    fd: ev.data() as RawFd,
                    readable: flags.intersects(EpollFlags::EPOLLIN | EpollFlags::EPOLLHUP),
                    writable: flags.intersects(EpollFlags::EPOLLOUT),
                }
            })
            .collect())
    }
}
