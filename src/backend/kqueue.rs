//! BSD/macOS readiness backend built on kevent.
//!
//! kqueue tracks read and write interest as two separate filters, so this
//! backend keeps per-token bookkeeping of the filters currently installed
//! and issues `EV_ADD`/`EV_DELETE` change lists when interest changes.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

use hashbrown::HashMap;

use super::wake::{WakeHandle, WakePipe};
use super::{Event, Events, Interest, Multiplexer, RawSource, SourceKind, Token};

/// Upper bound on events taken from the kernel per wait call.
const EVENT_BATCH: usize = 64;

/// Level-triggered kevent multiplexer with a self-pipe wake channel.
#[derive(Debug)]
pub(crate) struct KqueueBackend {
    kq: OwnedFd,
    wake: WakePipe,
    /// Filters currently installed per registration.
    registered: HashMap<Token, (RawFd, Interest)>,
}

impl KqueueBackend {
    /// Opens the kernel queue and wake pipe and registers the pipe's read
    /// end under [`Token::WAKE`].
    ///
    /// # Errors
    ///
    /// Returns the native error on any setup step; partially-acquired
    /// descriptors are closed before returning.
    pub fn new() -> io::Result<Self> {
        let raw = unsafe { libc::kqueue() };
        if raw == -1 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: kqueue() succeeded and the descriptor is owned here.
        let kq = unsafe { OwnedFd::from_raw_fd(raw) };

        let wake = WakePipe::new()?;

        let backend = Self {
            kq,
            wake,
            registered: HashMap::new(),
        };
        backend.change_filter(
            backend.wake.read_fd(),
            libc::EVFILT_READ,
            libc::EV_ADD,
            Token::WAKE,
        )?;

        tracing::debug!(kq = backend.kq.as_raw_fd(), "kqueue backend ready");
        Ok(backend)
    }

    fn change_filter(
        &self,
        fd: RawFd,
        filter: i16,
        flags: u16,
        token: Token,
    ) -> io::Result<()> {
        let change = libc::kevent {
            ident: fd as usize,
            filter,
            flags,
            fflags: 0,
            data: 0,
            udata: token.0 as usize as *mut libc::c_void,
        };

        let rc = unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                &change,
                1,
                std::ptr::null_mut(),
                0,
                std::ptr::null(),
            )
        };
        if rc == -1 {
            let err = io::Error::last_os_error();
            // Deleting a filter that is not installed is a no-op for us.
            if flags & libc::EV_DELETE != 0 && err.raw_os_error() == Some(libc::ENOENT) {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    fn apply(&self, fd: RawFd, token: Token, old: Interest, new: Interest) -> io::Result<()> {
        if new.is_readable() && !old.is_readable() {
            self.change_filter(fd, libc::EVFILT_READ, libc::EV_ADD, token)?;
        }
        if !new.is_readable() && old.is_readable() {
            self.change_filter(fd, libc::EVFILT_READ, libc::EV_DELETE, token)?;
        }
        if new.is_writable() && !old.is_writable() {
            self.change_filter(fd, libc::EVFILT_WRITE, libc::EV_ADD, token)?;
        }
        if !new.is_writable() && old.is_writable() {
            self.change_filter(fd, libc::EVFILT_WRITE, libc::EV_DELETE, token)?;
        }
        Ok(())
    }
}

impl Multiplexer for KqueueBackend {
    fn register(
        &mut self,
        source: RawSource,
        token: Token,
        _kind: SourceKind,
        interest: Interest,
    ) -> io::Result<()> {
        self.apply(source, token, Interest::NONE, interest)?;
        self.registered.insert(token, (source, interest));
        Ok(())
    }

    fn reregister(
        &mut self,
        source: RawSource,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        let old = self
            .registered
            .get(&token)
            .map_or(Interest::NONE, |&(_, interest)| interest);
        self.apply(source, token, old, interest)?;
        self.registered.insert(token, (source, interest));
        Ok(())
    }

    fn deregister(&mut self, source: RawSource, token: Token) -> io::Result<()> {
        let old = self
            .registered
            .remove(&token)
            .map_or(Interest::NONE, |(_, interest)| interest);
        self.apply(source, token, old, Interest::NONE)
    }

    fn poll(&mut self, events: &mut Events, timeout: Duration) -> io::Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut buf: [libc::kevent; EVENT_BATCH] = unsafe { std::mem::zeroed() };

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let ts = libc::timespec {
                tv_sec: remaining.as_secs() as libc::time_t,
                tv_nsec: libc::c_long::from(remaining.subsec_nanos() as i32),
            };

            let n = unsafe {
                libc::kevent(
                    self.kq.as_raw_fd(),
                    std::ptr::null(),
                    0,
                    buf.as_mut_ptr(),
                    EVENT_BATCH as libc::c_int,
                    &ts,
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
                let token = Token(raw.udata as usize as u64);
                if token == Token::WAKE {
                    self.wake.drain();
                    events.push(Event::wake());
                } else {
                    events.push(Event {
                        token,
                        readable: raw.filter == libc::EVFILT_READ,
                        writable: raw.filter == libc::EVFILT_WRITE,
                        error: raw.flags & libc::EV_ERROR != 0,
                        hangup: raw.flags & libc::EV_EOF != 0,
                    });
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
