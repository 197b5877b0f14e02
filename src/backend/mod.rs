//! Multiplexer abstraction over the native I/O event facilities.
//!
//! One contract, three bodies: level-triggered readiness polling through
//! epoll on Linux and kevent on the BSDs/macOS, and a true completion port
//! on Windows whose completions are translated into synthetic readiness
//! events by its adapter. The engine above this module is written entirely
//! against the readiness model and never learns which body is active.

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) mod epoll;
#[cfg(windows)]
pub(crate) mod iocp;
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub(crate) mod kqueue;
#[cfg(unix)]
pub(crate) mod wake;

use std::io;
use std::time::Duration;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) use epoll::EpollBackend as PlatformBackend;
#[cfg(windows)]
pub(crate) use iocp::IocpBackend as PlatformBackend;
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub(crate) use kqueue::KqueueBackend as PlatformBackend;

#[cfg(windows)]
pub(crate) use iocp::WakeHandle;
#[cfg(unix)]
pub(crate) use wake::WakeHandle;

/// Native descriptor type registered with a multiplexer.
#[cfg(unix)]
pub(crate) type RawSource = std::os::fd::RawFd;
/// Native descriptor type registered with a multiplexer.
#[cfg(windows)]
pub(crate) type RawSource = std::os::windows::io::RawSocket;

/// Identifies a registration in events reported by a multiplexer.
///
/// The engine packs a generation-checked handle into the token, so an event
/// reported for a socket that was closed (and whose slot was reused) in the
/// same batch fails the generation check instead of reaching the new owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Token(pub u64);

impl Token {
    /// Reserved token for the cross-thread wake channel.
    pub const WAKE: Token = Token(u64::MAX);
}

/// Transport flavor of a registered socket.
///
/// Readiness backends do not care, but the completion backend must probe
/// datagram sockets with a peek so the probe never consumes a datagram
/// meant for the engine's real receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceKind {
    Stream,
    Datagram,
}

/// Interest flags for a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Interest(u8);

impl Interest {
    pub const NONE: Interest = Interest(0);
    pub const READABLE: Interest = Interest(0b01);
    pub const WRITABLE: Interest = Interest(0b10);

    #[must_use]
    pub const fn is_readable(self) -> bool {
        self.0 & Self::READABLE.0 != 0
    }

    #[must_use]
    pub const fn is_writable(self) -> bool {
        self.0 & Self::WRITABLE.0 != 0
    }

    #[must_use]
    pub const fn with(self, other: Interest) -> Interest {
        Interest(self.0 | other.0)
    }

    #[must_use]
    pub const fn without(self, other: Interest) -> Interest {
        Interest(self.0 & !other.0)
    }
}

impl std::ops::BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        self.with(rhs)
    }
}

/// A single readiness (or synthesized completion) report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Event {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
    pub hangup: bool,
}

impl Event {
    /// Event produced when the wake channel fires.
    #[must_use]
    pub const fn wake() -> Self {
        Self {
            token: Token::WAKE,
            readable: true,
            writable: false,
            error: false,
            hangup: false,
        }
    }

    #[must_use]
    pub const fn is_wake(&self) -> bool {
        matches!(self.token, Token::WAKE)
    }
}

/// Growable batch of events filled by one poll call.
#[derive(Debug, Default)]
pub(crate) struct Events {
    inner: Vec<Event>,
}

impl Events {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn push(&mut self, event: Event) {
        self.inner.push(event);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.inner.iter()
    }

    /// Moves the batch out, leaving the buffer empty but with its capacity.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Event> {
        self.inner.drain(..)
    }
}

impl<'a> IntoIterator for &'a Events {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One multiplexer contract over three native facilities.
///
/// Implementations are single-threaded apart from the wake handle: all
/// registration and poll calls happen on the engine's loop thread, while
/// [`WakeHandle`] may be used from any thread to interrupt a blocking poll.
pub(crate) trait Multiplexer {
    /// Registers a descriptor for the given interest under `token`.
    ///
    /// # Errors
    ///
    /// Returns the native error if the registration is rejected.
    fn register(
        &mut self,
        source: RawSource,
        token: Token,
        kind: SourceKind,
        interest: Interest,
    ) -> io::Result<()>;

    /// Replaces the interest set of an existing registration.
    ///
    /// # Errors
    ///
    /// Returns the native error if the descriptor is not registered.
    fn reregister(&mut self, source: RawSource, token: Token, interest: Interest)
    -> io::Result<()>;

    /// Removes a registration and drops any pending state that references it.
    ///
    /// # Errors
    ///
    /// Returns the native error if the removal fails; callers treat this as
    /// best-effort during teardown.
    fn deregister(&mut self, source: RawSource, token: Token) -> io::Result<()>;

    /// Blocks until interest fires or `timeout` elapses.
    ///
    /// Returns the number of events appended to `events`; zero means the
    /// timeout elapsed. A wait interrupted by a signal is retried against
    /// the remaining timeout and never surfaces as an error.
    ///
    /// # Errors
    ///
    /// Returns the native error for non-transient poll failures.
    fn poll(&mut self, events: &mut Events, timeout: Duration) -> io::Result<usize>;

    /// Returns the cross-thread wake primitive for this multiplexer.
    fn wake_handle(&self) -> WakeHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_flag_algebra() {
        let both = Interest::READABLE | Interest::WRITABLE;
        assert!(both.is_readable());
        assert!(both.is_writable());

        let read_only = both.without(Interest::WRITABLE);
        assert!(read_only.is_readable());
        assert!(!read_only.is_writable());

        assert!(!Interest::NONE.is_readable());
        assert!(!Interest::NONE.is_writable());
    }

    #[test]
    fn wake_event_is_flagged() {
        let ev = Event::wake();
        assert!(ev.is_wake());
        assert_eq!(ev.token, Token::WAKE);
    }

    #[test]
    fn events_batch_drains_clean() {
        let mut events = Events::with_capacity(4);
        events.push(Event::wake());
        events.push(Event::wake());
        assert_eq!(events.len(), 2);
        assert_eq!(events.drain().count(), 2);
        assert!(events.is_empty());
    }
}
