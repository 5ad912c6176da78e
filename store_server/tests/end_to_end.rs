// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Integration tests that drive a real `store_server` over its Unix-domain
//! socket, the way `rpc_protocol/tests/rpcbind.rs` drives a real `rpcbind`
//! from a background thread. These cover the end-to-end scenarios in
//! spec.md §8.

use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use std::num::NonZeroUsize;

use nix::sys::mman::{mmap, MapFlags, ProtFlags};

use store_protocol::{client, conn, pipe};
use store_server::arena::MmapArena;

fn unique_socket_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "shmstore-test-{name}-{}.sock",
        std::process::id()
    ))
}

fn start_server(name: &str) -> std::path::PathBuf {
    let path = unique_socket_path(name);
    let _ = std::fs::remove_file(&path);
    let spawn_path = path.clone();
    std::thread::spawn(move || {
        store_server::server::run(&spawn_path, MmapArena::new());
    });
    wait_for_server(&path)
}

fn wait_for_server(path: &std::path::Path) -> std::path::PathBuf {
    let mut counter = 200;
    while counter > 0 {
        if UnixStream::connect(path).is_ok() {
            return path.to_path_buf();
        }
        std::thread::sleep(Duration::from_millis(10));
        counter -= 1;
    }
    panic!("timeout waiting for store_server at {}", path.display());
}

fn connect(path: &std::path::Path) -> UnixStream {
    UnixStream::connect(path).expect("connect to store_server")
}

/// Read `len` bytes at `offset` out of a passed arena fd by mmapping it,
/// the way a real consumer process would. Borrows `fd` rather than taking
/// ownership: the caller's `OwnedFd` (from the reply) still owns the
/// descriptor and closes it when it goes out of scope.
fn read_mapped(fd: &impl AsFd, map_size: i64, offset: i64, len: usize) -> Vec<u8> {
    let map_len = NonZeroUsize::new(map_size.max(1) as usize).unwrap();
    let ptr = unsafe {
        mmap(None, map_len, ProtFlags::PROT_READ, MapFlags::MAP_SHARED, fd, 0)
            .expect("mmap arena fd")
    };
    let base = ptr.as_ptr() as *const u8;
    let slice = unsafe { std::slice::from_raw_parts(base.add(offset as usize), len) };
    let out = slice.to_vec();
    unsafe { nix::sys::mman::munmap(ptr, map_len.get()).ok() };
    out
}

fn write_mapped(fd: &impl AsFd, map_size: i64, offset: i64, bytes: &[u8]) {
    let map_len = NonZeroUsize::new(map_size.max(1) as usize).unwrap();
    let ptr = unsafe {
        mmap(
            None,
            map_len,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_SHARED,
            fd,
            0,
        )
        .expect("mmap arena fd")
    };
    let base = ptr.as_ptr() as *mut u8;
    let dst = unsafe { std::slice::from_raw_parts_mut(base.add(offset as usize), bytes.len()) };
    dst.copy_from_slice(bytes);
    unsafe { nix::sys::mman::munmap(ptr, map_len.get()).ok() };
}

/// Scenario 1: create/seal/get on one client, bytes survive the round trip
/// through the passed arena fd.
#[test]
fn create_seal_get_round_trips_bytes() {
    let path = start_server("create-seal-get");
    let sock = connect(&path);

    let id = [0x01u8; 20];
    let payload = b"DEADBEEFCAFEBABE";

    let reply = client::create(&sock, id, payload.len() as i64, 0).unwrap();
    let fd = reply.fd.expect("CREATE reply carries a passed fd");
    write_mapped(&fd, reply.payload.map_size, reply.payload.data_offset, payload);

    client::seal(&sock, id).unwrap();

    let get_reply = client::get(&sock, id).unwrap();
    assert_eq!(get_reply.payload.data_size, payload.len() as i64);
    let fd2 = get_reply.fd.expect("GET reply carries a passed fd");
    let got = read_mapped(
        &fd2,
        get_reply.payload.map_size,
        get_reply.payload.data_offset,
        payload.len(),
    );
    assert_eq!(got, payload);
}

/// Scenario 2: a client blocked on GET before SEAL receives exactly one
/// delayed reply; a client that GETs after SEAL gets an immediate one.
#[test]
fn waiter_receives_delayed_reply_on_seal() {
    let path = start_server("waiter-fanout");
    let id = [0x02u8; 20];

    let client_a = connect(&path);
    let client_b = connect(&path);

    // Client A's GET blocks (in its own thread) until the server seals.
    let waiter = std::thread::spawn(move || client::get(&client_a, id).unwrap());

    // Give the server a moment to register A as a waiter before B seals.
    std::thread::sleep(Duration::from_millis(50));

    let reply = client::create(&client_b, id, 4, 0).unwrap();
    write_mapped(
        &reply.fd.unwrap(),
        reply.payload.map_size,
        reply.payload.data_offset,
        b"abcd",
    );
    client::seal(&client_b, id).unwrap();

    let delayed = waiter.join().unwrap();
    assert_eq!(delayed.payload.data_size, 4);
    assert!(delayed.fd.is_some());

    let client_c = connect(&path);
    let immediate = client::get(&client_c, id).unwrap();
    assert_eq!(immediate.payload.data_size, 4);
}

/// Scenario 3: a subscriber attached before any CREATE sees sealed
/// identifiers in exactly the order they were sealed.
#[test]
fn subscriber_sees_seal_order() {
    let path = start_server("subscriber-order");
    let sub_client = connect(&path);
    let (notify_local, notify_remote) = pipe::pipe().unwrap();

    client::subscribe(&sub_client, notify_remote.as_raw_fd()).unwrap();
    drop(notify_remote);
    // Give the server a moment to process SUBSCRIBE before any CREATE
    // arrives, matching spec.md §4.D's attach-before-activity precondition.
    std::thread::sleep(Duration::from_millis(50));

    let producer = connect(&path);
    let ids: [[u8; 20]; 3] = [[0x03u8; 20], [0x04u8; 20], [0x05u8; 20]];
    for id in ids {
        let reply = client::create(&producer, id, 1, 0).unwrap();
        write_mapped(
            &reply.fd.unwrap(),
            reply.payload.map_size,
            reply.payload.data_offset,
            b"x",
        );
        client::seal(&producer, id).unwrap();
    }

    for expected in ids {
        let got = conn::recv_notification(&notify_local).unwrap();
        assert_eq!(got, expected);
    }
}

/// Scenario 5: CONTAINS distinguishes open-but-unsealed from sealed.
#[test]
fn contains_reflects_seal_state() {
    let path = start_server("contains-semantics");
    let sock = connect(&path);
    let id = [0x06u8; 20];

    client::create(&sock, id, 0, 0).unwrap();
    assert!(!client::contains(&sock, id).unwrap());

    client::seal(&sock, id).unwrap();
    assert!(client::contains(&sock, id).unwrap());
}

/// Boundary: a zero-size object is a valid allocation, observable via
/// CONTAINS once sealed.
#[test]
fn zero_size_object_is_observable_after_seal() {
    let path = start_server("zero-size");
    let sock = connect(&path);
    let id = [0x07u8; 20];

    let reply = client::create(&sock, id, 0, 0).unwrap();
    assert_eq!(reply.payload.data_size, 0);
    assert_eq!(reply.payload.metadata_size, 0);

    client::seal(&sock, id).unwrap();
    assert!(client::contains(&sock, id).unwrap());
}

/// SEAL of an identifier that was never created is a silent no-op: it must
/// not wedge the connection or the server.
#[test]
fn seal_of_unknown_id_is_a_no_op() {
    let path = start_server("seal-unknown");
    let sock = connect(&path);

    client::seal(&sock, [0x08u8; 20]).unwrap();

    // The server must still be responsive afterward.
    let id = [0x09u8; 20];
    client::create(&sock, id, 0, 0).unwrap();
    client::seal(&sock, id).unwrap();
    assert!(client::contains(&sock, id).unwrap());
}

/// Scenario 4: a subscriber that never drains its notification queue must
/// not stall CREATE/SEAL on other clients. Notification sends are
/// non-blocking (`MSG_DONTWAIT`); a full send buffer only defers that one
/// subscriber's drain, per spec.md §4.D's backpressure contract.
#[test]
fn backpressure_does_not_stall_other_clients() {
    let path = start_server("backpressure");

    let sub_client = connect(&path);
    let (notify_local, notify_remote) = pipe::pipe().unwrap();
    client::subscribe(&sub_client, notify_remote.as_raw_fd()).unwrap();
    drop(notify_remote);
    std::thread::sleep(Duration::from_millis(50));

    // Shrink the subscriber's own receive window so its queue backs up
    // almost immediately instead of draining at line rate; the subscriber
    // never reads from `notify_local` for the rest of the test.
    let _ = nix::sys::socket::setsockopt(&notify_local, nix::sys::socket::sockopt::RcvBuf, &1usize);

    let producer = connect(&path);
    let start = std::time::Instant::now();
    for i in 0..2000u32 {
        let mut id = [0u8; 20];
        id[..4].copy_from_slice(&i.to_be_bytes());
        let reply = client::create(&producer, id, 1, 0).unwrap();
        write_mapped(
            &reply.fd.unwrap(),
            reply.payload.map_size,
            reply.payload.data_offset,
            b"x",
        );
        client::seal(&producer, id).unwrap();
    }
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_secs(10),
        "CREATE/SEAL on a second client took {elapsed:?} with a stalled subscriber queued behind it"
    );

    // The server is still fully responsive to a normal round-trip.
    let id = [0xffu8; 20];
    client::create(&producer, id, 0, 0).unwrap();
    client::seal(&producer, id).unwrap();
    assert!(client::contains(&producer, id).unwrap());
}

/// Scenario 6: a duplicate CREATE for a still-open identifier is a fatal
/// precondition violation — the server process exits non-zero. Spawns the
/// real `store_server` binary, since this is the one property that can
/// only be observed from outside the process.
#[test]
fn duplicate_create_is_fatal() {
    let socket_path = unique_socket_path("duplicate-create");
    let _ = std::fs::remove_file(&socket_path);

    let mut child = std::process::Command::new(env!("CARGO_BIN_EXE_store_server"))
        .arg("-s")
        .arg(&socket_path)
        .spawn()
        .expect("spawn store_server");

    wait_for_server(&socket_path);

    let sock = connect(&socket_path);
    let id = [0x0au8; 20];
    client::create(&sock, id, 8, 0).unwrap();
    // The second CREATE for the same still-open id never gets a reply —
    // the server exits instead — so its result is ignored here rather
    // than unwrapped.
    let _ = client::create(&sock, id, 8, 0);

    let status = child.wait().expect("wait on store_server child");
    assert!(
        !status.success(),
        "store_server should have exited non-zero after a duplicate CREATE"
    );
}
