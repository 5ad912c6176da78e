// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Subscribers and notification delivery (component D): a per-subscriber
//! ordered queue of pending identifiers, drained on write-readiness with
//! backpressure (spec.md §4.D).

use std::collections::{HashMap, VecDeque};
use std::os::fd::RawFd;

use log::warn;
use store_protocol::{conn, ObjectId, NOTIFICATION_FRAME_LEN};

use crate::error::Error;
use crate::rawfd::Fd;

struct Queue {
    pending: VecDeque<ObjectId>,
    /// Bytes of the frontmost identifier already written to the socket. A
    /// short `sendmsg` on the raw, unframed notification stream must be
    /// resumed from this exact offset next drain, never resent from byte
    /// zero, or the subscriber's frame stream desyncs permanently.
    sent: usize,
}

pub struct Subscribers {
    queues: HashMap<RawFd, Queue>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self {
            queues: HashMap::new(),
        }
    }

    /// Register a new, empty queue for `fd`. Callers are responsible for
    /// checking spec.md's precondition (object table empty) before calling
    /// this; it is not re-checked here so the table stays a plain data
    /// structure with no knowledge of the rest of the store.
    pub fn register(&mut self, fd: RawFd) {
        self.queues.insert(
            fd,
            Queue {
                pending: VecDeque::new(),
                sent: 0,
            },
        );
    }

    /// Drop the queue for `fd` and close it (spec.md §9 open question 4:
    /// the queue must not leak past the subscriber's disconnect).
    pub fn remove(&mut self, fd: RawFd) {
        self.queues.remove(&fd);
    }

    pub fn is_subscriber(&self, fd: RawFd) -> bool {
        self.queues.contains_key(&fd)
    }

    /// Append `id` to every subscriber queue, in the server's global seal
    /// order, then try to drain each one opportunistically. Call sites
    /// should ignore the returned list of fds whose drain hit a hard I/O
    /// error other than would-block and treat those as a disconnect.
    pub fn enqueue_all(&mut self, id: ObjectId) -> Vec<RawFd> {
        let mut failed = Vec::new();
        for queue in self.queues.values_mut() {
            queue.pending.push_back(id);
        }

        for fd in self.queues.keys().copied().collect::<Vec<_>>() {
            match self.drain(fd) {
                Ok(()) => {}
                Err(_) => failed.push(fd),
            }
        }
        failed
    }

    /// Pop identifiers from the front of `fd`'s queue and send each as a
    /// raw 20-byte frame. Stops as soon as a send makes no further
    /// progress (true would-block), leaving the remaining prefix queued —
    /// including a partially-sent frame's tail, tracked by `Queue::sent` —
    /// for the next write-readiness callback. Any other I/O error is
    /// returned to the caller, who treats it as a disconnect (this table
    /// does not decide that policy itself).
    pub fn drain(&mut self, fd: RawFd) -> Result<(), Error> {
        let Some(queue) = self.queues.get_mut(&fd) else {
            return Ok(());
        };

        while let Some(id) = queue.pending.front().copied() {
            match conn::send_notification(&Fd(fd), &id, queue.sent) {
                Ok(n) if n >= NOTIFICATION_FRAME_LEN => {
                    queue.pending.pop_front();
                    queue.sent = 0;
                }
                Ok(n) => {
                    queue.sent = n;
                    break;
                }
                Err(e) => {
                    warn!("subscriber {fd}: drain failed: {e}");
                    return Err(Error::Io(std::io::Error::other(e.to_string())));
                }
            }
        }

        Ok(())
    }
}

impl Default for Subscribers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;
    use store_protocol::pipe;

    #[test]
    fn register_and_drain_delivers_in_order() {
        let (subscriber_sock, test_reader) = pipe::pipe().unwrap();
        let fd = subscriber_sock.as_raw_fd();

        let mut subs = Subscribers::new();
        subs.register(fd);

        let a = [1u8; 20];
        let b = [2u8; 20];
        subs.enqueue_all(a);
        subs.enqueue_all(b);

        let got_a = conn::recv_notification(&test_reader).unwrap();
        let got_b = conn::recv_notification(&test_reader).unwrap();
        assert_eq!(got_a, a);
        assert_eq!(got_b, b);
    }

    #[test]
    fn remove_drops_the_queue() {
        let mut subs = Subscribers::new();
        subs.register(99);
        assert!(subs.is_subscriber(99));
        subs.remove(99);
        assert!(!subs.is_subscriber(99));
    }

    /// Forces a real short write by shrinking the socket's send buffer to a
    /// single byte, then drains repeatedly while a reader thread drains the
    /// other end concurrently — exactly the condition spec.md §8 scenario
    /// 4 exercises. A frame that splits across multiple `sendmsg` calls
    /// must still arrive byte-for-byte and in order; a regression here
    /// previously resent the whole 20-byte frame on every resumed drain,
    /// desyncing the raw, unframed notification stream.
    #[test]
    fn drain_resumes_a_partial_frame_without_desyncing() {
        use nix::sys::socket::{setsockopt, sockopt};
        use std::io::Read;

        let (subscriber_sock, mut test_reader) = pipe::pipe().unwrap();
        let fd = subscriber_sock.as_raw_fd();

        setsockopt(&subscriber_sock, sockopt::SndBuf, &1usize).unwrap();

        let mut subs = Subscribers::new();
        subs.register(fd);

        let ids = [[1u8; 20], [2u8; 20], [3u8; 20]];
        for id in ids {
            subs.enqueue_all(id);
        }

        let reader = std::thread::spawn(move || {
            let mut collected = Vec::new();
            let mut buf = [0u8; 4096];
            while collected.len() < ids.len() * NOTIFICATION_FRAME_LEN {
                let n = test_reader.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                collected.extend_from_slice(&buf[..n]);
            }
            collected
        });

        for _ in 0..5000 {
            subs.drain(fd).unwrap();
            std::thread::sleep(std::time::Duration::from_micros(200));
        }

        let collected = reader.join().unwrap();
        assert_eq!(collected.len(), ids.len() * NOTIFICATION_FRAME_LEN);
        for (i, expected) in ids.iter().enumerate() {
            let start = i * NOTIFICATION_FRAME_LEN;
            assert_eq!(&collected[start..start + NOTIFICATION_FRAME_LEN], expected);
        }
    }
}
