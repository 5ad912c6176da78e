// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Socket I/O for the command protocol: length-prefixed framing plus
//! optional fd-passing via `SCM_RIGHTS` ancillary data, and the unframed
//! raw-identifier stream used on subscriber sockets.
//!
//! This is the "socket I/O and framed-message codec" that spec.md treats as
//! an external collaborator of the store core: the core calls into this
//! module with already-decoded values and never touches `sendmsg`/`recvmsg`
//! directly.

use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags, UnixAddr};

use crate::error::{Error, ProtocolError};
use crate::wire::{Header, MessageType, ObjectId, NOTIFICATION_FRAME_LEN};

/// Room for one passed fd's worth of ancillary data, plus a little slack.
const CMSG_BUF_LEN: usize = 64;

/// A decoded command-socket message: its type, its raw (still-encoded)
/// payload, and a passed fd if the kernel delivered one.
pub struct Received {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
    pub fd: Option<OwnedFd>,
}

/// Send one framed message on `sock`, optionally passing `fd` via ancillary
/// data in the same `sendmsg` call.
pub fn send_message<S: AsRawFd>(
    sock: &S,
    message_type: MessageType,
    payload: &[u8],
    fd: Option<RawFd>,
) -> Result<(), Error> {
    let header = Header {
        message_type: message_type as i64,
        length: payload.len() as i64,
    };
    let header_bytes = header.encode();

    let iov = [IoSlice::new(&header_bytes), IoSlice::new(payload)];

    let raw_fd;
    let cmsgs: &[ControlMessage] = match fd {
        Some(f) => {
            raw_fd = [f];
            &[ControlMessage::ScmRights(&raw_fd)]
        }
        None => &[],
    };

    sendmsg::<UnixAddr>(sock.as_raw_fd(), &iov, cmsgs, MsgFlags::empty(), None)?;

    Ok(())
}

/// Receive one framed message from `sock`, along with any fd passed via
/// ancillary data. Returns `Error::Disconnected` if the peer closed the
/// connection before sending anything.
pub fn recv_message<S: AsRawFd>(sock: &S) -> Result<Received, Error> {
    let mut header_buf = [0u8; Header::LEN];
    let mut cmsg_buf = vec![0u8; CMSG_BUF_LEN];

    let (n, fd) = {
        let mut iov = [IoSliceMut::new(&mut header_buf)];
        let msg = recvmsg::<UnixAddr>(
            sock.as_raw_fd(),
            &mut iov,
            Some(&mut cmsg_buf),
            MsgFlags::empty(),
        )?;

        let fd = take_first_fd(msg.cmsgs()?);
        (msg.bytes, fd)
    };

    if n == 0 {
        return Err(Error::Disconnected);
    }
    if n < Header::LEN {
        return Err(ProtocolError::Truncated.into());
    }

    let header = Header::decode(&header_buf);
    let message_type = MessageType::try_from(header.message_type)?;

    if header.length < 0 {
        return Err(ProtocolError::Truncated.into());
    }

    let mut payload = vec![0u8; header.length as usize];
    if !payload.is_empty() {
        let mut iov = [IoSliceMut::new(&mut payload)];
        let n = recvmsg::<UnixAddr>(sock.as_raw_fd(), &mut iov, None, MsgFlags::empty())?.bytes;
        if n < payload.len() {
            return Err(ProtocolError::Truncated.into());
        }
    }

    Ok(Received {
        message_type,
        payload,
        fd,
    })
}

fn take_first_fd(cmsgs: impl Iterator<Item = ControlMessageOwned>) -> Option<OwnedFd> {
    for cmsg in cmsgs {
        if let ControlMessageOwned::ScmRights(fds) = cmsg {
            if let Some(raw) = fds.into_iter().next() {
                use std::os::fd::FromRawFd;
                // SAFETY: the kernel handed this process ownership of `raw`
                // via SCM_RIGHTS; nothing else in this process has claimed it.
                return Some(unsafe { OwnedFd::from_raw_fd(raw) });
            }
        }
    }
    None
}

/// Write as much of a raw 20-byte identifier frame as the socket's send
/// buffer currently has room for, resuming at `sent` bytes already written
/// by a previous call (the frame is unframed on the wire, so a short write
/// must be continued from the exact byte it stopped at, never resent from
/// the start — spec.md §6's "raw 20-byte identifiers, back-to-back, no
/// framing header" has no resync point once misaligned). Loops the
/// underlying `sendmsg` immediately while it keeps making progress, and
/// stops only on a true would-block or a completed frame. Returns the
/// total bytes of this frame now sent (`sent..NOTIFICATION_FRAME_LEN` if
/// the frame completed).
pub fn send_notification<S: AsRawFd>(sock: &S, id: &ObjectId, sent: usize) -> Result<usize, Error> {
    let mut sent = sent;
    while sent < NOTIFICATION_FRAME_LEN {
        let iov = [IoSlice::new(&id[sent..])];
        match sendmsg::<UnixAddr>(sock.as_raw_fd(), &iov, &[], MsgFlags::MSG_DONTWAIT, None) {
            Ok(0) => break,
            Ok(n) => sent += n,
            Err(nix::Error::EAGAIN) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(sent)
}

/// Read one raw 20-byte identifier frame from a subscriber socket (test/
/// client-side helper).
pub fn recv_notification<S: AsRawFd>(sock: &S) -> Result<ObjectId, Error> {
    let mut id = [0u8; NOTIFICATION_FRAME_LEN];
    let mut iov = [IoSliceMut::new(&mut id)];
    let n = recvmsg::<UnixAddr>(sock.as_raw_fd(), &mut iov, None, MsgFlags::empty())?.bytes;

    if n == 0 {
        return Err(Error::Disconnected);
    }
    if n < NOTIFICATION_FRAME_LEN {
        return Err(ProtocolError::Truncated.into());
    }

    Ok(id)
}
