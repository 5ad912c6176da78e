// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! A thin, blocking client for the store protocol. Not part of the store
//! core (spec.md scopes the client-side library out), but every end-to-end
//! test needs something on the other side of the wire, so this gives tests
//! ergonomic one-call-per-request helpers instead of hand-rolling
//! `conn::send_message`/`recv_message` at every call site.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use crate::conn;
use crate::error::Error;
use crate::wire::{MessageType, ObjectId, ReplyPayload, RequestPayload};

/// Result of a request whose reply may carry a passed fd.
pub struct Reply {
    pub payload: ReplyPayload,
    pub fd: Option<OwnedFd>,
}

fn request<S: AsRawFd>(
    sock: &S,
    message_type: MessageType,
    payload: &RequestPayload,
) -> Result<Reply, Error> {
    conn::send_message(sock, message_type, &payload.serialize_alloc(), None)?;
    let received = conn::recv_message(sock)?;
    Ok(Reply {
        payload: ReplyPayload::deserialize(&received.payload)?,
        fd: received.fd,
    })
}

/// Send CREATE and wait for the immediate reply (handle + passed fd).
pub fn create<S: AsRawFd>(
    sock: &S,
    id: ObjectId,
    data_size: i64,
    metadata_size: i64,
) -> Result<Reply, Error> {
    let req = RequestPayload {
        id,
        data_size,
        metadata_size,
        ..Default::default()
    };
    request(sock, MessageType::Create, &req)
}

/// Send SEAL. Fire-and-forget: spec.md only defines a reply to *waiters*
/// for SEAL, not to the sealing client itself.
pub fn seal<S: AsRawFd>(sock: &S, id: ObjectId) -> Result<(), Error> {
    let req = RequestPayload {
        id,
        ..Default::default()
    };
    conn::send_message(sock, MessageType::Seal, &req.serialize_alloc(), None)
}

/// Send GET. If the object is not yet sealed, this call blocks on `sock`
/// until the server later sends the delayed reply.
pub fn get<S: AsRawFd>(sock: &S, id: ObjectId) -> Result<Reply, Error> {
    let req = RequestPayload {
        id,
        ..Default::default()
    };
    request(sock, MessageType::Get, &req)
}

/// Send CONTAINS; the reply never carries a passed fd.
pub fn contains<S: AsRawFd>(sock: &S, id: ObjectId) -> Result<bool, Error> {
    let req = RequestPayload {
        id,
        ..Default::default()
    };
    let reply = request(sock, MessageType::Contains, &req)?;
    Ok(reply.payload.has_object != 0)
}

/// Send DELETE. Fire-and-forget: spec.md does not define a reply for DELETE.
pub fn delete<S: AsRawFd>(sock: &S, id: ObjectId) -> Result<(), Error> {
    let req = RequestPayload {
        id,
        ..Default::default()
    };
    conn::send_message(sock, MessageType::Delete, &req.serialize_alloc(), None)
}

/// Send SUBSCRIBE, passing `notify_fd` as the ancillary fd for the
/// dedicated notification socket.
pub fn subscribe<S: AsRawFd>(sock: &S, notify_fd: RawFd) -> Result<(), Error> {
    let req = RequestPayload::default();
    conn::send_message(
        sock,
        MessageType::Subscribe,
        &req.serialize_alloc(),
        Some(notify_fd),
    )
}

/// Send DISCONNECT. The server tears down its side on receiving this; the
/// caller is expected to close its own end afterward.
pub fn disconnect<S: AsRawFd>(sock: &S) -> Result<(), Error> {
    let req = RequestPayload::default();
    conn::send_message(sock, MessageType::Disconnect, &req.serialize_alloc(), None)
}
