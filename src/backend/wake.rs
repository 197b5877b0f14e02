//! Cross-thread wake channel for the readiness backends.
//!
//! A nonblocking self-pipe: the read end stays registered with the
//! multiplexer under [`Token::WAKE`](super::Token::WAKE) for as long as the
//! proactor lives, and any thread holding a [`WakeHandle`] can interrupt a
//! blocking wait by writing one byte to the write end. Delivery is
//! at-least-once: wakes issued before the loop drains the pipe coalesce
//! into a single drain and are never lost.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;

/// Both ends of the wake pipe; owned by the backend.
#[derive(Debug)]
pub(crate) struct WakePipe {
    read: OwnedFd,
    write: Arc<OwnedFd>,
}

impl WakePipe {
    /// Opens the pipe and marks both ends nonblocking and close-on-exec.
    ///
    /// # Errors
    ///
    /// Returns the native error if the pipe cannot be created or
    /// configured; nothing is leaked on failure.
    pub fn new() -> io::Result<Self> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: pipe() succeeded, both descriptors are fresh and owned here.
        let read = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        let write = unsafe { OwnedFd::from_raw_fd(fds[1]) };

        set_nonblocking_cloexec(read.as_raw_fd())?;
        set_nonblocking_cloexec(write.as_raw_fd())?;

        Ok(Self {
            read,
            write: Arc::new(write),
        })
    }

    /// The descriptor the backend registers for read-interest.
    #[must_use]
    pub fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    /// Empties the pipe after a wake fired.
    ///
    /// Reads until the pipe reports would-block, so any number of queued
    /// wake bytes collapse into one drain.
    pub fn drain(&self) {
        let mut scratch = [0u8; 64];
        loop {
            let n = unsafe {
                libc::read(
                    self.read.as_raw_fd(),
                    scratch.as_mut_ptr().cast(),
                    scratch.len(),
                )
            };
            if n <= 0 {
                break;
            }
        }
    }

    /// A cloneable handle other threads use to wake the loop.
    #[must_use]
    pub fn handle(&self) -> WakeHandle {
        WakeHandle {
            write: Arc::clone(&self.write),
        }
    }
}

/// Cross-thread wake primitive; cheap to clone, safe from any thread.
#[derive(Debug, Clone)]
pub struct WakeHandle {
    write: Arc<OwnedFd>,
}

impl WakeHandle {
    /// Writes one byte to the wake pipe.
    ///
    /// A full pipe means a wake is already pending, which counts as
    /// success; any other write failure is ignored here and will surface
    /// through the loop's own status if the pipe is truly broken.
    pub fn wake(&self) {
        let byte = [1u8];
        let n = unsafe { libc::write(self.write.as_raw_fd(), byte.as_ptr().cast(), 1) };
        if n == -1 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::WouldBlock {
                tracing::warn!(error = %err, "wake pipe write failed");
            }
        }
    }
}

fn set_nonblocking_cloexec(fd: RawFd) -> io::Result<()> {
    // O_NONBLOCK so drains terminate; FD_CLOEXEC so children do not hold
    // the loop's wake channel open.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
        return Err(io::Error::last_os_error());
    }

    let fd_flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if fd_flags == -1 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFD, fd_flags | libc::FD_CLOEXEC) } == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_then_drain_empties_pipe() {
        let pipe = WakePipe::new().expect("pipe");
        let handle = pipe.handle();

        handle.wake();
        handle.wake();
        handle.wake();
        pipe.drain();

        // Pipe must now be empty: a nonblocking read reports would-block.
        let mut scratch = [0u8; 8];
        let n = unsafe { libc::read(pipe.read_fd(), scratch.as_mut_ptr().cast(), scratch.len()) };
        assert_eq!(n, -1);
        assert_eq!(
            io::Error::last_os_error().kind(),
            io::ErrorKind::WouldBlock
        );
    }

    #[test]
    fn wake_from_other_thread() {
        let pipe = WakePipe::new().expect("pipe");
        let handle = pipe.handle();

        std::thread::spawn(move || handle.wake()).join().expect("join");

        let mut scratch = [0u8; 8];
        let n = unsafe { libc::read(pipe.read_fd(), scratch.as_mut_ptr().cast(), scratch.len()) };
        assert_eq!(n, 1);
    }
}
