//! Privilege dropping for worker processes.
//!
//! Workers only ever need their inherited descriptors and plain file I/O.
//! On Linux the closest cheap analogue to a syscall allowlist entry point
//! is `PR_SET_NO_NEW_PRIVS`, which pins the process out of acquiring new
//! privileges for the rest of its life.

use crate::IpcError;

/// Drop privileges for the rest of this process's lifetime.
///
/// Call once at worker startup, after the bus fd is adopted and before any
/// request is processed.
pub fn drop_privileges() -> Result<(), IpcError> {
    #[cfg(target_os = "linux")]
    {
        let rc = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
        if rc == -1 {
            return Err(IpcError::Io(std::io::Error::last_os_error()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn drop_privileges_succeeds() {
        super::drop_privileges().unwrap();
    }
}
