//! Sticky SIGINT flag for worker loops.
//!
//! The handler only sets an atomic; workers poll
//! [`sigint_received`] at the top of each loop iteration and bail with
//! `Cancelled`, so cancellation latency is one blocking syscall.

use std::sync::atomic::{AtomicBool, Ordering};

static SIGINT_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn catch_sigint(_signo: libc::c_int) {
    SIGINT_RECEIVED.store(true, Ordering::Relaxed);
}

/// Install the SIGINT handler. Safe to call more than once.
pub fn install_handler() {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = catch_sigint as extern "C" fn(libc::c_int) as usize;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
    }
}

/// Has SIGINT been delivered since startup?
pub fn sigint_received() -> bool {
    SIGINT_RECEIVED.load(Ordering::Relaxed)
}
