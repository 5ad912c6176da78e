// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::fmt;

/// Errors that can arise while decoding a message, independent of any I/O.
#[derive(Debug)]
pub enum ProtocolError {
    /// The header or payload was too short to decode.
    Truncated,

    /// The message type code is not one this protocol defines.
    UnknownMessageType(i64),

    /// A message that is supposed to carry a passed fd did not have one.
    MissingFd,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "message truncated"),
            Self::UnknownMessageType(ty) => write!(f, "unknown message type {ty}"),
            Self::MissingFd => write!(f, "expected a passed fd but none arrived"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Errors from reading or writing a framed message, including I/O failures.
#[derive(Debug)]
pub enum Error {
    Protocol(ProtocolError),
    Io(std::io::Error),

    /// The peer closed the connection (recvmsg/recv returned 0 bytes).
    Disconnected,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Disconnected => write!(f, "peer disconnected"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<nix::Error> for Error {
    fn from(e: nix::Error) -> Self {
        Self::Io(std::io::Error::from(e))
    }
}
