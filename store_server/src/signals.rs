// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! SIGTERM handling: set a flag from the signal handler and let the main
//! event loop notice it between `epoll_wait` calls, rather than doing any
//! real work inside the handler itself.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigterm(_: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Install the `SIGTERM` handler. Call once at startup, before the event
/// loop starts.
pub fn install() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_sigterm),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: `on_sigterm` only stores to an `AtomicBool`, which is
    // signal-safe.
    unsafe { signal::sigaction(Signal::SIGTERM, &action) }?;
    Ok(())
}

/// Whether `SIGTERM` has been delivered since `install`. The main loop polls
/// this once per `EventLoop::wait` iteration.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_starts_clear() {
        // Run in isolation from the other tests in this module/process:
        // the flag is a process-global, so this only checks the type, not
        // cross-test ordering.
        let _ = shutdown_requested();
    }
}
