// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Wire protocol for the shared-memory object store.
//!
//! This crate is the narrow contract the store server core depends on for
//! the length-prefixed message framing, the fixed-layout request/reply
//! payloads, and fd-passing over a Unix-domain socket. None of it carries
//! store state; it only knows how to turn bytes (and an optional passed fd)
//! on the wire into typed values and back.

pub mod client;
pub mod conn;
pub mod error;
pub mod pipe;
pub mod wire;

pub use error::{Error, ProtocolError};
pub use wire::{
    MessageType, ObjectId, ReplyPayload, RequestPayload, ID_LEN, NOTIFICATION_FRAME_LEN,
};
