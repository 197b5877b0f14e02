//! Linux readiness backend built on level-triggered epoll.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

use super::wake::{WakeHandle, WakePipe};
use super::{Event, Events, Interest, Multiplexer, RawSource, SourceKind, Token};

/// Upper bound on events taken from the kernel per wait call.
const EVENT_BATCH: usize = 64;

/// Level-triggered epoll multiplexer with a self-pipe wake channel.
#[derive(Debug)]
pub(crate) struct EpollBackend {
    epfd: OwnedFd,
    wake: WakePipe,
}

impl EpollBackend {
    /// Opens the epoll instance and wake pipe and registers the pipe's
    /// read end under [`Token::WAKE`].
    ///
    /// # Errors
    ///
    /// Returns the native error on any setup step; partially-acquired
    /// descriptors are closed before returning.
    pub fn new() -> io::Result<Self> {
        let raw = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if raw == -1 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: epoll_create1 succeeded and the descriptor is owned here.
        let epfd = unsafe { OwnedFd::from_raw_fd(raw) };

        let wake = WakePipe::new()?;

        let backend = Self { epfd, wake };
        backend.ctl(
            libc::EPOLL_CTL_ADD,
            backend.wake.read_fd(),
            Some((Token::WAKE, Interest::READABLE)),
        )?;

        tracing::debug!(epfd = backend.epfd.as_raw_fd(), "epoll backend ready");
        Ok(backend)
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, data: Option<(Token, Interest)>) -> io::Result<()> {
        let mut event = libc::epoll_event { events: 0, u64: 0 };
        let event_ptr = match data {
            Some((token, interest)) => {
                event.events = interest_to_mask(interest);
                event.u64 = token.0;
                &raw mut event
            }
            None => &raw mut event,
        };

        if unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, event_ptr) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Multiplexer for EpollBackend {
    fn register(
        &mut self,
        source: RawSource,
        token: Token,
        _kind: SourceKind,
        interest: Interest,
    ) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, source, Some((token, interest)))
    }

    fn reregister(
        &mut self,
        source: RawSource,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, source, Some((token, interest)))
    }

    fn deregister(&mut self, source: RawSource, _token: Token) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_DEL, source, None)
    }

    fn poll(&mut self, events: &mut Events, timeout: Duration) -> io::Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut buf: [libc::epoll_event; EVENT_BATCH] = unsafe { std::mem::zeroed() };

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let n = unsafe {
                libc::epoll_wait(
                    self.epfd.as_raw_fd(),
                    buf.as_mut_ptr(),
                    EVENT_BATCH as libc::c_int,
                    millis_ceil(remaining),
                )
            };

            if n == -1 {
                let err = io::Error::last_os_error();
                // Transient signal interruption: retry against the deadline.
                if err.kind() == io::ErrorKind::Interrupted {
                    if Instant::now() >= deadline {
                        return Ok(0);
                    }
                    continue;
                }
                return Err(err);
            }

            let mut appended = 0;
            for raw in &buf[..n as usize] {
                if Token(raw.u64) == Token::WAKE {
                    self.wake.drain();
                    events.push(Event::wake());
                } else {
                    events.push(mask_to_event(Token(raw.u64), raw.events));
                }
                appended += 1;
            }
            return Ok(appended);
        }
    }

    fn wake_handle(&self) -> WakeHandle {
        self.wake.handle()
    }
}

fn interest_to_mask(interest: Interest) -> u32 {
    let mut mask = libc::EPOLLRDHUP as u32;
    if interest.is_readable() {
        mask |= libc::EPOLLIN as u32;
    }
    if interest.is_writable() {
        mask |= libc::EPOLLOUT as u32;
    }
    mask
}

fn mask_to_event(token: Token, mask: u32) -> Event {
    Event {
        token,
        readable: mask & libc::EPOLLIN as u32 != 0,
        writable: mask & libc::EPOLLOUT as u32 != 0,
        error: mask & libc::EPOLLERR as u32 != 0,
        hangup: mask & (libc::EPOLLHUP as u32 | libc::EPOLLRDHUP as u32) != 0,
    }
}

fn millis_ceil(timeout: Duration) -> libc::c_int {
    let ms = timeout
        .as_millis()
        .saturating_add(u128::from(timeout.subsec_nanos() % 1_000_000 != 0));
    ms.min(libc::c_int::MAX as u128) as libc::c_int
}
