// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::fmt;

use log::error;

/// Non-fatal errors the core's tables and allocator can return. These are
/// ordinary `Result`s: the caller (the dispatcher) decides whether a given
/// occurrence is fatal per spec.md's error taxonomy (§7) rather than this
/// type encoding fatality itself — that keeps the tables unit-testable
/// without exiting the test process.
#[derive(Debug)]
pub enum Error {
    /// `insert_open` was called with an identifier already present in
    /// either `open` or `sealed`.
    AlreadyExists,

    /// `DELETE` was requested for an identifier not currently in `sealed`.
    NotSealed,

    /// `SUBSCRIBE` arrived while the object table was non-empty.
    SubscribeAfterActivity,

    Io(std::io::Error),
    Protocol(store_protocol::ProtocolError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists => write!(f, "identifier already exists"),
            Self::NotSealed => write!(f, "identifier is not sealed"),
            Self::SubscribeAfterActivity => {
                write!(f, "subscribe arrived after object activity")
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<nix::Error> for Error {
    fn from(e: nix::Error) -> Self {
        Self::Io(std::io::Error::from(e))
    }
}

impl From<store_protocol::ProtocolError> for Error {
    fn from(e: store_protocol::ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<store_protocol::Error> for Error {
    fn from(e: store_protocol::Error) -> Self {
        match e {
            store_protocol::Error::Io(e) => Self::Io(e),
            store_protocol::Error::Protocol(e) => Self::Protocol(e),
            store_protocol::Error::Disconnected => {
                Self::Io(std::io::Error::from(std::io::ErrorKind::UnexpectedEof))
            }
        }
    }
}

/// Terminate the process after logging `msg`, for the precondition
/// violations spec.md §7 marks fatal (duplicate CREATE, DELETE of
/// something not sealed, SUBSCRIBE after activity, an unknown message
/// type, or a command-socket I/O failure). These indicate client bugs the
/// core is not designed to tolerate, so this is a deliberate process exit
/// rather than a panic: it always logs first and exits with a fixed
/// non-zero code, regardless of which invariant tripped it.
pub fn fatal(msg: impl fmt::Display) -> ! {
    error!("fatal: {msg}");
    std::process::exit(1);
}
