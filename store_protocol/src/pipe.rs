// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! A connected pair of Unix-domain stream sockets, built with
//! `socketpair(2)`, for exercising the protocol and a test server without a
//! filesystem path. Mirrors the teacher crate's `pipe` test helper.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};

pub struct Endpoint {
    fd: OwnedFd,
}

impl Endpoint {
    pub fn from_owned_fd(fd: OwnedFd) -> Self {
        Self { fd }
    }
}

pub fn pipe() -> std::io::Result<(Endpoint, Endpoint)> {
    let (a, b) = socketpair(
        AddressFamily::Unix,
        SockType::Stream,
        None,
        SockFlag::empty(),
    )?;

    Ok((Endpoint { fd: a }, Endpoint { fd: b }))
}

impl AsRawFd for Endpoint {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl std::io::Read for Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(nix::unistd::read(&self.fd, buf)?)
    }
}

impl std::io::Write for Endpoint {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(nix::unistd::write(&self.fd, buf)?)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
