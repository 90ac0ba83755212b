/*!
 * Shutdown Signals
 * Async-signal-safe flag set by SIGINT, SIGTERM, and SIGQUIT
 */

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(_: nix::libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Install the termination handlers. Call once, before launching
/// children.
pub fn install() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGQUIT] {
        // Safety: the handler only touches an atomic flag
        unsafe {
            sigaction(sig, &action)?;
        }
    }
    Ok(())
}

/// Has a termination signal arrived?
pub fn requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

/// Request shutdown from inside the process.
pub fn request() {
    SHUTDOWN.store(true, Ordering::SeqCst);
}
