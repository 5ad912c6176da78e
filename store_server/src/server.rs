// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The accept/dispatch loop (components E, F, D tied together) and the
//! listener setup around it, factored out of `bin/store_server.rs` so
//! integration tests can start a real server the same way the binary does
//! (mirroring the teacher's `rpcbind::server::main`, which its own
//! integration tests call directly from a background thread).

use std::os::fd::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;

use log::{info, warn};

use crate::arena::Arena;
use crate::dispatcher;
use crate::error::fatal;
use crate::event_loop::{EventLoop, Interest, Ready};
use crate::signals;
use crate::state::{Connection, Store};

/// Bind `socket_path`, removing a stale socket file if one is already
/// there, and run the event loop until `SIGTERM` is observed. Any setup
/// failure (bind, event loop creation) is fatal, per spec.md §6's exit
/// code rule.
pub fn run<A: Arena>(socket_path: &Path, arena: A) {
    if socket_path.exists() {
        if let Err(e) = std::fs::remove_file(socket_path) {
            fatal(format!(
                "socket path {} exists and could not be removed: {e}",
                socket_path.display()
            ));
        }
    }

    let listener = match UnixListener::bind(socket_path) {
        Ok(l) => l,
        Err(e) => fatal(format!("failed to bind socket {}: {e}", socket_path.display())),
    };
    if let Err(e) = listener.set_nonblocking(true) {
        fatal(format!("failed to set listener non-blocking: {e}"));
    }

    info!(
        "store_server listening on {} (pid {})",
        socket_path.display(),
        std::process::id()
    );

    let event_loop = match EventLoop::new() {
        Ok(e) => e,
        Err(e) => fatal(format!("failed to create event loop: {e}")),
    };

    let listener_fd = listener.as_raw_fd();
    if let Err(e) = event_loop.add_fd(listener_fd, Interest::Read) {
        fatal(format!("failed to register listener: {e}"));
    }

    let mut store = Store::new(arena);
    main_loop(&listener, &event_loop, &mut store);
}

fn main_loop<A: Arena>(listener: &UnixListener, event_loop: &EventLoop, store: &mut Store<A>) {
    let listener_fd = listener.as_raw_fd();

    loop {
        if signals::shutdown_requested() {
            info!("SIGTERM received, shutting down");
            return;
        }

        let ready = match event_loop.wait() {
            Ok(r) => r,
            Err(e) => fatal(format!("event loop wait failed: {e}")),
        };

        for event in ready {
            handle_ready(listener, listener_fd, event_loop, store, event);
        }
    }
}

fn handle_ready<A: Arena>(
    listener: &UnixListener,
    listener_fd: std::os::fd::RawFd,
    event_loop: &EventLoop,
    store: &mut Store<A>,
    event: Ready,
) {
    if event.fd == listener_fd {
        if event.readable {
            accept_all(listener, event_loop, store);
        }
        return;
    }

    if store.subscribers.is_subscriber(event.fd) {
        if event.writable {
            if let Err(e) = store.subscribers.drain(event.fd) {
                warn!("subscriber {}: {e}, disconnecting", event.fd);
                store.disconnect(event_loop, event.fd);
            }
        }
        return;
    }

    if event.readable {
        dispatcher::handle_client_readable(store, event_loop, event.fd);
    }
}

/// Component F: accept every connection the listener currently has queued.
/// The listener is non-blocking, so this drains the whole backlog rather
/// than handling just one connection per wakeup.
fn accept_all<A: Arena>(listener: &UnixListener, event_loop: &EventLoop, store: &mut Store<A>) {
    loop {
        match listener.accept() {
            Ok((stream, _addr)) => {
                let fd = register_client(event_loop, store, stream);
                info!("accepted client {fd}");
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => {
                warn!("accept failed: {e}");
                break;
            }
        }
    }
}

fn register_client<A: Arena>(
    event_loop: &EventLoop,
    store: &mut Store<A>,
    stream: UnixStream,
) -> std::os::fd::RawFd {
    if let Err(e) = stream.set_nonblocking(true) {
        fatal(format!("failed to set client socket non-blocking: {e}"));
    }
    let owned: std::os::fd::OwnedFd = stream.into();
    let fd = owned.as_raw_fd();

    if let Err(e) = event_loop.add_fd(fd, Interest::Read) {
        fatal(format!("failed to register client {fd}: {e}"));
    }
    store.conns.insert(fd, Connection::Client(owned));
    fd
}
