//! Small shared helpers that need a raw fd, not exposed outside the crate.

use std::os::fd::RawFd;

/// Writes `data` to `fd` using `send(2)` with `MSG_NOSIGNAL`, so a write to
/// a half-closed peer returns an error instead of raising `SIGPIPE`.
pub(crate) fn send_no_sigpipe(fd: RawFd, data: &[u8]) -> std::io::Result<usize> {
    let n = unsafe {
        libc::send(
            fd,
            data.as_ptr() as *const libc::c_void,
            data.len(),
            libc::MSG_NOSIGNAL,
        )
    };
    if n < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}
