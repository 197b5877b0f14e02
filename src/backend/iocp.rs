//! Windows completion backend built on an I/O completion port.
//!
//! IOCP is a true completion facility: operations are submitted up front
//! and the port reports when they finish. The engine above this module is
//! written against readiness semantics, so this adapter synthesizes
//! readiness from completions: for read interest it keeps a zero-byte
//! `WSARecv` posted (which completes when data is available) and for write
//! interest a zero-byte `WSASend` (which completes when the socket can
//! accept data). The completion of such a probe is reported as an ordinary
//! `readable`/`writable` event, after which the engine performs the real
//! nonblocking I/O itself. This file is the one place the
//! completion/readiness asymmetry is allowed to leak.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;

use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE, WAIT_TIMEOUT};
use windows_sys::Win32::Networking::WinSock::{
    MSG_PEEK, SOCKET, SOCKET_ERROR, WSABUF, WSAGetLastError, WSARecv, WSASend, WSA_IO_PENDING,
};
use windows_sys::Win32::System::IO::{
    CancelIoEx, CreateIoCompletionPort, GetQueuedCompletionStatusEx, OVERLAPPED,
    OVERLAPPED_ENTRY, PostQueuedCompletionStatus,
};

use super::{Event, Events, Interest, Multiplexer, RawSource, SourceKind, Token};

/// Upper bound on completions taken from the port per wait call.
const EVENT_BATCH: usize = 64;

/// Completion key reserved for cross-thread wakes.
const WAKE_KEY: usize = usize::MAX;

/// Owned completion port handle, shared with wake handles.
#[derive(Debug)]
struct Port(HANDLE);

// SAFETY: a completion port handle may be used concurrently from any
// thread; Windows serializes port operations internally.
unsafe impl Send for Port {}
unsafe impl Sync for Port {}

impl Drop for Port {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.0) };
    }
}

/// Cross-thread wake primitive; posts a completion under the wake key.
#[derive(Debug, Clone)]
pub struct WakeHandle {
    port: Arc<Port>,
}

impl WakeHandle {
    /// Queues one wake completion; coalescing happens at the drain side.
    pub fn wake(&self) {
        let ok = unsafe {
            PostQueuedCompletionStatus(self.port.0, 0, WAKE_KEY, std::ptr::null())
        };
        if ok == 0 {
            tracing::warn!(
                error = %io::Error::last_os_error(),
                "posting wake completion failed"
            );
        }
    }
}

/// Direction probed by an outstanding zero-byte operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Recv,
    Send,
}

/// Overlapped state for one probe direction; boxed so its address is
/// stable for the lifetime of the submitted operation.
#[repr(C)]
struct ProbeOp {
    overlapped: OVERLAPPED,
    busy: bool,
}

impl ProbeOp {
    fn new() -> Box<Self> {
        Box::new(Self {
            overlapped: unsafe { std::mem::zeroed() },
            busy: false,
        })
    }
}

/// Per-socket adapter state.
struct SockState {
    socket: SOCKET,
    kind: SourceKind,
    interest: Interest,
    recv: Box<ProbeOp>,
    send: Box<ProbeOp>,
}

impl SockState {
    /// Identifies which probe a dequeued completion belongs to.
    fn classify(&self, overlapped: *mut OVERLAPPED) -> Option<Probe> {
        if std::ptr::eq(overlapped, &raw const self.recv.overlapped as *mut OVERLAPPED) {
            Some(Probe::Recv)
        } else if std::ptr::eq(overlapped, &raw const self.send.overlapped as *mut OVERLAPPED) {
            Some(Probe::Send)
        } else {
            None
        }
    }

    fn idle(&self) -> bool {
        !self.recv.busy && !self.send.busy
    }
}

/// Completion-port multiplexer reporting synthetic readiness events.
pub(crate) struct IocpBackend {
    port: Arc<Port>,
    sockets: HashMap<Token, SockState>,
    /// Deregistered sockets whose probes have not yet drained; their
    /// overlapped state must stay allocated until the port stops
    /// referencing it.
    zombies: Vec<(Token, SockState)>,
}

impl IocpBackend {
    /// Opens the completion port.
    ///
    /// # Errors
    ///
    /// Returns the native error if the port cannot be created.
    pub fn new() -> io::Result<Self> {
        let raw = unsafe {
            CreateIoCompletionPort(INVALID_HANDLE_VALUE, std::ptr::null_mut(), 0, 0)
        };
        if raw.is_null() {
            return Err(io::Error::last_os_error());
        }

        tracing::debug!("iocp backend ready");
        Ok(Self {
            port: Arc::new(Port(raw)),
            sockets: HashMap::new(),
            zombies: Vec::new(),
        })
    }

    /// Posts the zero-byte probes required by the current interest set.
    fn arm(state: &mut SockState) -> io::Result<()> {
        if state.interest.is_readable() && !state.recv.busy {
            let mut wsabuf = WSABUF {
                len: 0,
                buf: std::ptr::null_mut(),
            };
            // A zero-byte datagram receive without MSG_PEEK dequeues and
            // truncates the pending datagram; peeking leaves it for the
            // engine's real receive. Stream probes carry no data either way.
            let mut flags: u32 = match state.kind {
                SourceKind::Datagram => MSG_PEEK as u32,
                SourceKind::Stream => 0,
            };
            let rc = unsafe {
                WSARecv(
                    state.socket,
                    &mut wsabuf,
                    1,
                    std::ptr::null_mut(),
                    &mut flags,
                    &raw mut state.recv.overlapped,
                    None,
                )
            };
            if rc == SOCKET_ERROR && unsafe { WSAGetLastError() } != WSA_IO_PENDING {
                return Err(io::Error::last_os_error());
            }
            // Synchronous completion still queues to the port.
            state.recv.busy = true;
        }

        if state.interest.is_writable() && !state.send.busy {
            let mut wsabuf = WSABUF {
                len: 0,
                buf: std::ptr::null_mut(),
            };
            let rc = unsafe {
                WSASend(
                    state.socket,
                    &mut wsabuf,
                    1,
                    std::ptr::null_mut(),
                    0,
                    &raw mut state.send.overlapped,
                    None,
                )
            };
            if rc == SOCKET_ERROR && unsafe { WSAGetLastError() } != WSA_IO_PENDING {
                return Err(io::Error::last_os_error());
            }
            state.send.busy = true;
        }

        Ok(())
    }

    /// Converts one dequeued completion into an event, if still relevant.
    ///
    /// The completion's own status is not inspected: a probe that failed
    /// still means the socket needs attention, and the engine's real
    /// nonblocking call surfaces the error. Datagram probes peek, so a
    /// truncation status on the probe leaves the datagram queued.
    fn absorb(&mut self, entry: &OVERLAPPED_ENTRY, events: &mut Events) -> bool {
        let token = Token(entry.lpCompletionKey as u64);
        if let Some(state) = self.sockets.get_mut(&token) {
            let Some(probe) = state.classify(entry.lpOverlapped) else {
                return false;
            };
            match probe {
                Probe::Recv => state.recv.busy = false,
                Probe::Send => state.send.busy = false,
            }

            let relevant = match probe {
                Probe::Recv => state.interest.is_readable(),
                Probe::Send => state.interest.is_writable(),
            };
            if relevant {
                events.push(Event {
                    token,
                    readable: probe == Probe::Recv,
                    writable: probe == Probe::Send,
                    error: false,
                    hangup: false,
                });
            }

            // Keep probing while interest persists; the engine drops
            // interest once the pending operation completes.
            if let Err(err) = Self::arm(state) {
                tracing::warn!(error = %err, "re-arming iocp probe failed");
            }
            return relevant;
        }

        // A completion for a deregistered socket: release its state once
        // both probes have drained.
        for (zombie_token, state) in &mut self.zombies {
            if *zombie_token == token {
                match state.classify(entry.lpOverlapped) {
                    Some(Probe::Recv) => state.recv.busy = false,
                    Some(Probe::Send) => state.send.busy = false,
                    None => {}
                }
                break;
            }
        }
        self.zombies.retain(|(_, state)| !state.idle());
        false
    }
}

impl Multiplexer for IocpBackend {
    fn register(
        &mut self,
        source: RawSource,
        token: Token,
        kind: SourceKind,
        interest: Interest,
    ) -> io::Result<()> {
        let socket = source as SOCKET;
        let attached = unsafe {
            CreateIoCompletionPort(socket as HANDLE, self.port.0, token.0 as usize, 0)
        };
        if attached.is_null() {
            return Err(io::Error::last_os_error());
        }

        let mut state = SockState {
            socket,
            kind,
            interest,
            recv: ProbeOp::new(),
            send: ProbeOp::new(),
        };
        Self::arm(&mut state)?;
        self.sockets.insert(token, state);
        Ok(())
    }

    fn reregister(
        &mut self,
        _source: RawSource,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        let state = self
            .sockets
            .get_mut(&token)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        state.interest = interest;
        Self::arm(state)
    }

    fn deregister(&mut self, source: RawSource, token: Token) -> io::Result<()> {
        let Some(state) = self.sockets.remove(&token) else {
            return Ok(());
        };

        if !state.idle() {
            // Cancel outstanding probes and park the state until their
            // completions drain from the port.
            unsafe { CancelIoEx(source as SOCKET as HANDLE, std::ptr::null()) };
            self.zombies.push((token, state));
        }
        Ok(())
    }

    fn poll(&mut self, events: &mut Events, timeout: Duration) -> io::Result<usize> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let millis = remaining.as_millis().min(u128::from(u32::MAX - 1)) as u32;

            let mut entries: [OVERLAPPED_ENTRY; EVENT_BATCH] = unsafe { std::mem::zeroed() };
            let mut removed: u32 = 0;
            let ok = unsafe {
                GetQueuedCompletionStatusEx(
                    self.port.0,
                    entries.as_mut_ptr(),
                    EVENT_BATCH as u32,
                    &mut removed,
                    millis,
                    0,
                )
            };

            if ok == 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(WAIT_TIMEOUT as i32) {
                    return Ok(0);
                }
                return Err(err);
            }

            let mut appended = 0;
            let mut woken = false;
            for entry in &entries[..removed as usize] {
                if entry.lpCompletionKey == WAKE_KEY {
                    // Collapse any number of queued wakes into one event.
                    if !woken {
                        woken = true;
                        events.push(Event::wake());
                        appended += 1;
                    }
                    continue;
                }
                let entry = *entry;
                if self.absorb(&entry, events) {
                    appended += 1;
                }
            }

            // Every dequeued completion was stale; report a timeout-shaped
            // empty batch only once the deadline passes, otherwise wait on.
            if appended == 0 && Instant::now() < deadline {
                continue;
            }
            return Ok(appended);
        }
    }

    fn wake_handle(&self) -> WakeHandle {
        WakeHandle {
            port: Arc::clone(&self.port),
        }
    }
}
