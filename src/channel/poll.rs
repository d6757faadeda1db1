//! Readiness wait on a raw descriptor.

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Wait until `fd` is readable (or hung up) for at most `timeout`.
///
/// Returns `Ok(false)` on timeout and on `EINTR`; callers re-check their
/// deadline and call again.
pub(crate) fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // Round up so a sub-millisecond remainder does not spin.
    let millis = timeout.as_micros().div_ceil(1000).min(libc::c_int::MAX as u128) as libc::c_int;

    // SAFETY: `pfd` is a valid pollfd for the duration of the call and the
    // count matches the single entry.
    let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(rc > 0)
}
