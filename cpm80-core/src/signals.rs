//! Terminating-signal and dump-request flags.
//!
//! Handlers only store into atomics; the interpreter loop polls them at
//! instruction boundaries and at every suspension point.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::libc::c_int;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::{CoreError, CoreResult};

static STOP: AtomicBool = AtomicBool::new(false);
static DUMP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_terminate(_: c_int) {
    STOP.store(true, Ordering::Relaxed);
}

extern "C" fn on_dump(_: c_int) {
    DUMP.store(true, Ordering::Relaxed);
}

/// Install SIGINT/SIGQUIT/SIGTERM as stop requests and SIGUSR1 as a
/// machine-state dump request.
pub fn install() -> CoreResult<()> {
    let stop = SigAction::new(
        SigHandler::Handler(on_terminate),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let dump = SigAction::new(
        SigHandler::Handler(on_dump),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGQUIT, Signal::SIGTERM] {
        unsafe { sigaction(sig, &stop) }.map_err(|e| CoreError::Signal(e.to_string()))?;
    }
    unsafe { sigaction(Signal::SIGUSR1, &dump) }.map_err(|e| CoreError::Signal(e.to_string()))?;
    Ok(())
}

/// A terminating signal has been delivered.
pub fn stop_requested() -> bool {
    STOP.load(Ordering::Relaxed)
}

/// Consume a pending dump request.
pub fn take_dump_request() -> bool {
    DUMP.swap(false, Ordering::Relaxed)
}

/// Test hook: raise the stop flag as a handler would.
pub fn request_stop() {
    STOP.store(true, Ordering::Relaxed);
}

/// Reset both flags (between test runs; harmless elsewhere).
pub fn reset() {
    STOP.store(false, Ordering::Relaxed);
    DUMP.store(false, Ordering::Relaxed);
}
