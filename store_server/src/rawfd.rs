// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! A zero-cost, non-owning `AsRawFd` view over a bare `RawFd`, so
//! `store_protocol::conn`'s socket helpers (which are generic over
//! `AsRawFd`) can be called against fds the connection/subscriber tables
//! own, without those tables giving up ownership for the duration of one
//! send/recv call.

use std::os::fd::{AsRawFd, RawFd};

pub struct Fd(pub RawFd);

impl AsRawFd for Fd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}
