// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The request dispatcher (component E): decodes a framed request on a
//! client fd, performs the lifecycle operation against the store state,
//! and emits a reply (possibly carrying a passed fd). spec.md §4.E is
//! followed message-type by message-type; see DESIGN.md for the handful
//! of places it is silent (whether DELETE/SEAL/SUBSCRIBE/DISCONNECT reply
//! to their own requester) and how this crate resolved them.

use std::os::fd::{AsRawFd, RawFd};

use log::{debug, warn};
use store_protocol::{conn, MessageType, ObjectId, ReplyPayload, RequestPayload};

use crate::arena::{Arena, Handle};
use crate::error::fatal;
use crate::event_loop::{EventLoop, Interest};
use crate::object_table::ObjectInfo;
use crate::rawfd::Fd;
use crate::state::{Connection, Store};

/// Handle one readable event on client fd `fd`: read exactly one framed
/// message and dispatch it. Returns once the reply (if any) has been sent.
/// An EOF read is treated as an implicit DISCONNECT rather than an error.
pub fn handle_client_readable<A: Arena>(
    store: &mut Store<A>,
    event_loop: &EventLoop,
    fd: RawFd,
) {
    let received = match conn::recv_message(&Fd(fd)) {
        Ok(r) => r,
        Err(store_protocol::Error::Disconnected) => {
            store.disconnect(event_loop, fd);
            return;
        }
        Err(e) => fatal(format!("I/O failure reading from client {fd}: {e}")),
    };

    debug!("client {fd}: {:?}", received.message_type);

    match received.message_type {
        MessageType::Create => handle_create(store, fd, &received.payload),
        MessageType::Get => handle_get(store, fd, &received.payload),
        MessageType::Contains => handle_contains(store, fd, &received.payload),
        MessageType::Seal => handle_seal(store, event_loop, &received.payload),
        MessageType::Delete => handle_delete(store, &received.payload),
        MessageType::Subscribe => handle_subscribe(store, event_loop, fd, received.fd),
        MessageType::Disconnect => store.disconnect(event_loop, fd),
        MessageType::Transfer | MessageType::Data => {
            fatal(format!("client {fd} sent unimplemented message type"))
        }
    }
}

fn decode_request(fd: RawFd, payload: &[u8]) -> RequestPayload {
    match RequestPayload::deserialize(payload) {
        Ok(req) => req,
        Err(e) => fatal(format!("client {fd}: malformed request: {e}")),
    }
}

fn reply_for(handle: Handle, info: &ObjectInfo) -> ReplyPayload {
    ReplyPayload {
        data_offset: handle.offset as i64,
        metadata_offset: handle.offset as i64 + info.data_size as i64,
        map_size: handle.map_size as i64,
        data_size: info.data_size as i64,
        metadata_size: info.metadata_size as i64,
        has_object: 1,
        store_fd_val: 0,
    }
}

fn handle_create<A: Arena>(store: &mut Store<A>, fd: RawFd, payload: &[u8]) {
    let req = decode_request(fd, payload);

    if req.data_size < 0 || req.metadata_size < 0 {
        fatal(format!("client {fd}: negative size in CREATE"));
    }
    let data_size = req.data_size as u64;
    let metadata_size = req.metadata_size as u64;

    let ptr = match store.arena.alloc(data_size + metadata_size) {
        Ok(ptr) => ptr,
        Err(e) => fatal(format!("arena allocation failed: {e}")),
    };
    let handle = store.arena.describe(&ptr);

    if let Err(e) =
        store
            .object_table
            .insert_open(req.id, ptr, handle, data_size, metadata_size)
    {
        fatal(format!(
            "CREATE for already-live id {:x?}: {e}",
            req.id
        ));
    }

    let info = ObjectInfo {
        data_size,
        metadata_size,
        create_time: std::time::SystemTime::now(),
        construction_duration: std::time::Duration::ZERO,
    };
    let reply = reply_for(handle, &info);

    if let Err(e) = conn::send_message(
        &Fd(fd),
        MessageType::Create,
        &reply.serialize_alloc(),
        Some(handle.fd),
    ) {
        fatal(format!("client {fd}: failed to reply to CREATE: {e}"));
    }
}

fn handle_get<A: Arena>(store: &mut Store<A>, fd: RawFd, payload: &[u8]) {
    let req = decode_request(fd, payload);

    if let Some(entry) = store.object_table.find_sealed(&req.id) {
        let reply = reply_for(entry.handle, &entry.info);
        let arena_fd = entry.handle.fd;

        if let Err(e) = conn::send_message(
            &Fd(fd),
            MessageType::Get,
            &reply.serialize_alloc(),
            Some(arena_fd),
        ) {
            fatal(format!("client {fd}: failed to reply to GET: {e}"));
        }
    } else {
        store.waiters.add_waiter(req.id, fd);
    }
}

fn handle_contains<A: Arena>(store: &Store<A>, fd: RawFd, payload: &[u8]) {
    let req = decode_request(fd, payload);

    let reply = ReplyPayload {
        has_object: store.object_table.find_sealed(&req.id).is_some() as i32,
        ..Default::default()
    };

    if let Err(e) = conn::send_message(&Fd(fd), MessageType::Contains, &reply.serialize_alloc(), None)
    {
        fatal(format!("client {fd}: failed to reply to CONTAINS: {e}"));
    }
}

fn handle_seal<A: Arena>(store: &mut Store<A>, event_loop: &EventLoop, payload: &[u8]) {
    // SEAL carries no reply fd of its own; any client fd is a valid sender.
    let req = decode_request(-1, payload);

    let Some(entry) = store.object_table.seal(&req.id) else {
        // Silently ignored per spec.md §4.B/§7: no entry, no reply, no
        // subscriber notification.
        return;
    };

    let reply = reply_for(entry.handle, &entry.info);
    let arena_fd = entry.handle.fd;

    notify_subscribers(store, event_loop, req.id);
    notify_waiters(store, req.id, &reply, arena_fd);
}

fn notify_subscribers<A: Arena>(store: &mut Store<A>, event_loop: &EventLoop, id: ObjectId) {
    let failed = store.subscribers.enqueue_all(id);
    for fd in failed {
        warn!("subscriber {fd}: dropping after drain failure");
        store.disconnect(event_loop, fd);
    }
}

fn notify_waiters<A: Arena>(store: &mut Store<A>, id: ObjectId, reply: &ReplyPayload, arena_fd: RawFd) {
    for waiter_fd in store.waiters.take_waiters(&id) {
        if let Err(e) = conn::send_message(
            &Fd(waiter_fd),
            MessageType::Get,
            &reply.serialize_alloc(),
            Some(arena_fd),
        ) {
            // The waiter's fd was reaped from this table already if it
            // disconnected cleanly (spec.md §9 open question 1); a send
            // failure here means it went away without DISCONNECT (e.g. a
            // crash). Log and move on rather than treat it as fatal — the
            // waiter, not the store, is at fault.
            warn!("waiter {waiter_fd}: failed to deliver sealed reply: {e}");
        }
    }
}

fn handle_delete<A: Arena>(store: &mut Store<A>, payload: &[u8]) {
    let req = decode_request(-1, payload);

    match store.object_table.remove_sealed(&req.id) {
        Ok(entry) => store.arena.free(entry.ptr),
        Err(e) => fatal(format!("DELETE for id {:x?} not sealed: {e}", req.id)),
    }
}

fn handle_subscribe<A: Arena>(
    store: &mut Store<A>,
    event_loop: &EventLoop,
    fd: RawFd,
    notify_fd: Option<std::os::fd::OwnedFd>,
) {
    if let Err(e) = store.object_table.check_empty_for_subscribe() {
        fatal(format!("client {fd}: {e}"));
    }

    let Some(notify_fd) = notify_fd else {
        fatal(format!("client {fd}: SUBSCRIBE carried no passed fd"));
    };

    let raw = notify_fd.as_raw_fd();
    store.subscribers.register(raw);

    if let Err(e) = event_loop.add_fd(raw, Interest::Write) {
        fatal(format!("failed to register subscriber {raw}: {e}"));
    }

    store.conns.insert(raw, Connection::Subscriber(notify_fd));
}
