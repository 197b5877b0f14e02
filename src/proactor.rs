//! The event-loop engine: one multiplexer, one socket registry, one thread.
//!
//! A [`Proactor`] owns the platform multiplexer and every socket opened
//! through it. [`run`](Proactor::run) blocks on the loop thread: each
//! iteration waits up to the tick period for readiness, drives the accept,
//! receive, and send sub-protocols for the sockets that fired, then runs
//! the tick callbacks. All completion is reported through callbacks, which
//! receive `&mut Proactor` and may freely open, close, start operations,
//! or stop the loop from inside the event they are handling.
//!
//! The proactor is not `Send`; it lives and runs on one thread. Other
//! threads interact only through [`ProactorHandle`], which can request a
//! stop or wake the loop out of its wait.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::backend::{
    Event, Events, Interest, Multiplexer, PlatformBackend, SourceKind, WakeHandle,
};
use crate::buffer::Buffer;
use crate::registry::{Registry, SocketHandle};
use crate::socket::{self, PendingSend, SocketEntry, SocketIo, SocketKind};
use crate::status::Status;

/// Engine-level lifecycle notifications delivered to the event callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    /// The loop has started executing.
    Run,
    /// One loop iteration finished dispatching socket events.
    Tick,
    /// The loop was woken from its wait by a [`ProactorHandle`].
    Wake,
    /// The loop is returning.
    Stop,
    /// The proactor is tearing down.
    Dispose,
}

/// Engine-level callback invoked for [`LoopEvent`] transitions.
pub type EventCallback = Box<dyn FnMut(&mut Proactor, LoopEvent, Status)>;

/// Cloneable cross-thread surface of a [`Proactor`].
///
/// `stop` and `wake` are the only operations another thread may perform;
/// everything else belongs to the loop thread.
#[derive(Clone)]
pub struct ProactorHandle {
    stop: Arc<AtomicBool>,
    wake: WakeHandle,
}

impl ProactorHandle {
    /// Requests the loop to stop and wakes it out of its wait. Idempotent.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.wake.wake();
    }

    /// Wakes the loop out of its current wait, producing a
    /// [`LoopEvent::Wake`]. Wakes coalesce; delivery is at-least-once.
    pub fn wake(&self) {
        self.wake.wake();
    }
}

/// Single-threaded callback-driven socket engine.
pub struct Proactor {
    backend: PlatformBackend,
    registry: Registry,
    tick_period: Duration,
    stop: Arc<AtomicBool>,
    status: Status,
    event_cb: Option<EventCallback>,
}

impl Proactor {
    /// Builds the engine and its platform multiplexer.
    ///
    /// # Errors
    ///
    /// [`Status::BadInput`] for a zero tick period, [`Status::SetupFailure`]
    /// if the multiplexer or its wake channel cannot be created. Nothing is
    /// left allocated on failure.
    pub fn new(tick_period: Duration) -> Result<Self, Status> {
        if tick_period.is_zero() {
            return Err(Status::BadInput);
        }
        let backend = PlatformBackend::new().map_err(|err| {
            tracing::warn!(error = %err, "multiplexer setup failed");
            Status::SetupFailure
        })?;

        tracing::debug!(tick = ?tick_period, "proactor created");
        Ok(Self {
            backend,
            registry: Registry::new(),
            tick_period,
            stop: Arc::new(AtomicBool::new(false)),
            status: Status::Ok,
            event_cb: None,
        })
    }

    /// Installs the engine-level event callback, replacing any previous one.
    pub fn set_event_callback(
        &mut self,
        cb: impl FnMut(&mut Proactor, LoopEvent, Status) + 'static,
    ) {
        self.event_cb = Some(Box::new(cb));
    }

    /// Returns the cross-thread handle for this engine.
    #[must_use]
    pub fn handle(&self) -> ProactorHandle {
        ProactorHandle {
            stop: Arc::clone(&self.stop),
            wake: self.backend.wake_handle(),
        }
    }

    /// Last sticky engine status; `Ok` unless the loop died on a poll error.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Number of live sockets.
    #[must_use]
    pub fn socket_count(&self) -> usize {
        self.registry.len()
    }

    /// Requests the loop to stop. Idempotent; also usable before `run`.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.backend.wake_handle().wake();
    }

    /// Runs the event loop until a stop request is observed.
    ///
    /// Each iteration waits up to one tick period, dispatches socket events
    /// in reported order, then fires [`LoopEvent::Tick`] and every live
    /// socket's tick callback. A wait that sees no events is an ordinary
    /// tick. Fires [`LoopEvent::Run`] on entry and [`LoopEvent::Stop`] on
    /// exit, and returns the final engine status.
    ///
    /// The stop flag is sticky: a stop requested before `run` makes it
    /// return after firing `Run` and `Stop`.
    pub fn run(&mut self) -> Status {
        tracing::debug!(tick = ?self.tick_period, "event loop running");
        self.fire_loop_event(LoopEvent::Run, Status::Ok);

        let mut events = Events::with_capacity(64);
        let mut batch: Vec<Event> = Vec::with_capacity(64);

        while !self.stop.load(Ordering::Acquire) {
            if let Err(err) = self.backend.poll(&mut events, self.tick_period) {
                self.status = Status::from_io(&err);
                tracing::warn!(error = %err, "wait failed, stopping loop");
                break;
            }

            batch.clear();
            batch.extend(events.drain());
            for event in &batch {
                if event.is_wake() {
                    self.fire_loop_event(LoopEvent::Wake, Status::Ok);
                } else {
                    self.dispatch(*event);
                }
            }

            self.fire_loop_event(LoopEvent::Tick, Status::Ok);
            for handle in self.registry.handles() {
                self.fire_tick(handle);
            }
        }

        tracing::debug!(status = %self.status, "event loop stopping");
        self.fire_loop_event(LoopEvent::Stop, self.status);
        self.status
    }

    /// Tears the engine down, releasing every live socket.
    ///
    /// Fires [`LoopEvent::Dispose`], then each socket's close callback with
    /// [`Status::Terminate`]. Pending buffers are dropped; the close
    /// callback is the only notification. Taking `self` by value keeps this
    /// impossible while `run` executes.
    pub fn dispose(mut self) {
        self.fire_loop_event(LoopEvent::Dispose, Status::Ok);
        for handle in self.registry.handles() {
            self.close_internal(handle, Status::Terminate);
        }
        tracing::debug!("proactor disposed");
    }

    /// Opens a socket of `kind` and registers it with the multiplexer.
    ///
    /// The address string is a literal IP (empty means the unspecified
    /// address): the local bind address for listeners and UDP sockets, the
    /// remote address for clients. Bind/listen/connect run blocking on the
    /// calling thread; the socket is nonblocking from then on. Listeners are
    /// armed for read immediately; clients and UDP sockets arm on demand.
    ///
    /// # Errors
    ///
    /// [`Status::BadInput`] for an unparsable address, otherwise the mapped
    /// native error. Failure leaves no socket behind.
    pub fn open(
        &mut self,
        kind: SocketKind,
        address: &str,
        port: u16,
    ) -> Result<SocketHandle, Status> {
        let addr = socket::parse_address(address, port)?;
        let mut entry = match kind {
            SocketKind::TcpListener => {
                SocketEntry::new_listener(map_io(socket::open_listener(addr))?)
            }
            SocketKind::TcpClient => {
                SocketEntry::new_stream(map_io(socket::open_client(addr))?, Some(addr))
            }
            SocketKind::Udp => SocketEntry::new_udp(map_io(socket::open_udp(addr))?),
        };

        let interest = match kind {
            SocketKind::TcpListener => Interest::READABLE,
            _ => Interest::NONE,
        };
        let source_kind = match kind {
            SocketKind::Udp => SourceKind::Datagram,
            SocketKind::TcpListener | SocketKind::TcpClient => SourceKind::Stream,
        };
        entry.interest = interest;
        let raw = entry.io.raw();

        let handle = self.registry.insert(entry);
        if let Err(err) = self
            .backend
            .register(raw, handle.to_token(), source_kind, interest)
        {
            self.registry.remove(handle);
            return Err(Status::from_io(&err));
        }

        tracing::debug!(?kind, %addr, "socket opened");
        Ok(handle)
    }

    /// Closes a socket: fires its close callback with `Ok`, deregisters it,
    /// and removes it. Synchronous; the handle is stale afterwards.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a handle that is already closed; nothing
    /// fires in that case.
    pub fn close(&mut self, handle: SocketHandle) -> Result<(), Status> {
        if self.registry.get(handle).is_none() {
            return Err(Status::NotFound);
        }
        self.close_internal(handle, Status::Ok);
        Ok(())
    }

    /// Local address of the socket.
    ///
    /// # Errors
    ///
    /// [`Status::NullReference`] for stale handles, else the mapped native
    /// error.
    pub fn local_addr(&self, handle: SocketHandle) -> Result<SocketAddr, Status> {
        let entry = self.registry.get(handle).ok_or(Status::NullReference)?;
        let local = match &entry.io {
            SocketIo::Listener(s) => s.local_addr(),
            SocketIo::Stream(s) => s.local_addr(),
            SocketIo::Udp(s) => s.local_addr(),
        };
        map_io(local)
    }

    /// Remote address, when one is known: the peer for clients, the source
    /// of the last received datagram for UDP sockets.
    ///
    /// # Errors
    ///
    /// [`Status::NullReference`] for stale handles, [`Status::NotFound`]
    /// when no remote is known yet.
    pub fn remote_addr(&self, handle: SocketHandle) -> Result<SocketAddr, Status> {
        let entry = self.registry.get(handle).ok_or(Status::NullReference)?;
        entry.remote.ok_or(Status::NotFound)
    }

    /// Installs the accept callback on a listener, replacing any previous
    /// one.
    ///
    /// # Errors
    ///
    /// [`Status::NullReference`] for stale handles, [`Status::NotAllowed`]
    /// on non-listeners.
    pub fn set_accept_callback(
        &mut self,
        handle: SocketHandle,
        cb: impl FnMut(&mut Proactor, SocketHandle, Result<SocketHandle, Status>) + 'static,
    ) -> Result<(), Status> {
        let entry = self.registry.get_mut(handle).ok_or(Status::NullReference)?;
        if entry.kind != SocketKind::TcpListener {
            return Err(Status::NotAllowed);
        }
        entry.callbacks.on_accept = Some(Box::new(cb));
        Ok(())
    }

    /// Installs the close callback, replacing any previous one.
    ///
    /// # Errors
    ///
    /// [`Status::NullReference`] for stale handles.
    pub fn set_close_callback(
        &mut self,
        handle: SocketHandle,
        cb: impl FnMut(&mut Proactor, SocketHandle, Status) + 'static,
    ) -> Result<(), Status> {
        let entry = self.registry.get_mut(handle).ok_or(Status::NullReference)?;
        entry.callbacks.on_close = Some(Box::new(cb));
        Ok(())
    }

    /// Installs the receive callback, replacing any previous one.
    ///
    /// # Errors
    ///
    /// [`Status::NullReference`] for stale handles.
    pub fn set_receive_callback(
        &mut self,
        handle: SocketHandle,
        cb: impl FnMut(&mut Proactor, SocketHandle, Option<SocketAddr>, Buffer, Status) + 'static,
    ) -> Result<(), Status> {
        let entry = self.registry.get_mut(handle).ok_or(Status::NullReference)?;
        entry.callbacks.on_receive = Some(Box::new(cb));
        Ok(())
    }

    /// Installs the send-complete callback, replacing any previous one.
    ///
    /// # Errors
    ///
    /// [`Status::NullReference`] for stale handles.
    pub fn set_sent_callback(
        &mut self,
        handle: SocketHandle,
        cb: impl FnMut(&mut Proactor, SocketHandle, Buffer, Status) + 'static,
    ) -> Result<(), Status> {
        let entry = self.registry.get_mut(handle).ok_or(Status::NullReference)?;
        entry.callbacks.on_sent = Some(Box::new(cb));
        Ok(())
    }

    /// Installs the per-socket tick callback, replacing any previous one.
    ///
    /// # Errors
    ///
    /// [`Status::NullReference`] for stale handles.
    pub fn set_tick_callback(
        &mut self,
        handle: SocketHandle,
        cb: impl FnMut(&mut Proactor, SocketHandle) + 'static,
    ) -> Result<(), Status> {
        let entry = self.registry.get_mut(handle).ok_or(Status::NullReference)?;
        entry.callbacks.on_tick = Some(Box::new(cb));
        Ok(())
    }

    /// Arms one receive: the buffer is held until data (or teardown)
    /// arrives, then handed back through the receive callback. One receive
    /// at a time; no automatic re-arm after completion. The buffer is
    /// dropped if this returns an error.
    ///
    /// # Errors
    ///
    /// [`Status::NullReference`] for stale handles, [`Status::NotAllowed`]
    /// on listeners, [`Status::BadInput`] for a zero-capacity buffer,
    /// [`Status::Busy`] while a receive is already pending.
    pub fn start_receive(&mut self, handle: SocketHandle, buf: Buffer) -> Result<(), Status> {
        let entry = self.registry.get_mut(handle).ok_or(Status::NullReference)?;
        if entry.kind == SocketKind::TcpListener {
            return Err(Status::NotAllowed);
        }
        if buf.capacity() == 0 {
            return Err(Status::BadInput);
        }
        if entry.recv.is_some() {
            return Err(Status::Busy);
        }
        entry.recv = Some(buf);

        if let Err(status) = self.sync_interest(handle) {
            if let Some(entry) = self.registry.get_mut(handle) {
                entry.recv = None;
            }
            return Err(status);
        }
        Ok(())
    }

    /// Arms one send of the buffer's used bytes. Partial native writes keep
    /// the socket write-armed until everything is flushed; the send-complete
    /// callback fires exactly once. One send at a time per socket. The
    /// buffer is dropped if this returns an error.
    ///
    /// UDP sockets reply to their known remote, learned from the last
    /// received datagram.
    ///
    /// # Errors
    ///
    /// [`Status::NullReference`] for stale handles, [`Status::NotAllowed`]
    /// on listeners, [`Status::BadInput`] for an empty buffer or a UDP
    /// socket with no known remote, [`Status::Busy`] while a send is
    /// already pending.
    pub fn start_send(&mut self, handle: SocketHandle, buf: Buffer) -> Result<(), Status> {
        let entry = self.registry.get_mut(handle).ok_or(Status::NullReference)?;
        if entry.kind == SocketKind::TcpListener {
            return Err(Status::NotAllowed);
        }
        if buf.is_empty() {
            return Err(Status::BadInput);
        }
        if entry.kind == SocketKind::Udp && entry.remote.is_none() {
            return Err(Status::BadInput);
        }
        if entry.send.is_some() {
            return Err(Status::Busy);
        }
        entry.send = Some(PendingSend { buf, offset: 0 });

        if let Err(status) = self.sync_interest(handle) {
            if let Some(entry) = self.registry.get_mut(handle) {
                entry.send = None;
            }
            return Err(status);
        }
        Ok(())
    }

    /// Routes one reported event to the sub-protocols. Liveness is
    /// re-checked between steps; a callback may have closed the socket.
    fn dispatch(&mut self, event: Event) {
        let handle = SocketHandle::from_token(event.token);
        let Some(entry) = self.registry.get(handle) else {
            tracing::trace!(token = event.token.0, "event for stale handle dropped");
            return;
        };
        let kind = entry.kind;

        if event.readable {
            match kind {
                SocketKind::TcpListener => self.do_accept(handle),
                SocketKind::TcpClient | SocketKind::Udp => self.do_receive(handle),
            }
        }

        if event.writable && self.registry.get(handle).is_some() {
            self.do_send(handle);
        }

        // Error or hangup with no data left to drain ends the socket here;
        // with readable set, the read path observes it as a zero read.
        if (event.error || event.hangup)
            && !event.readable
            && self.registry.get(handle).is_some()
        {
            let status = if event.error {
                Status::ExternalFailure
            } else {
                Status::Terminate
            };
            self.close_internal(handle, status);
        }
    }

    /// One native accept per read-ready event. Failed attempts report
    /// through the accept callback and leave the listener active.
    fn do_accept(&mut self, listener: SocketHandle) {
        let accepted = {
            let Some(entry) = self.registry.get(listener) else {
                return;
            };
            let SocketIo::Listener(sock) = &entry.io else {
                return;
            };
            sock.accept()
        };

        match accepted {
            Ok((stream, remote)) => {
                let result = self.adopt_stream(stream, remote);
                self.fire_accept(listener, result);
            }
            Err(err) if is_transient(&err) => {}
            Err(err) => {
                let status = Status::from_io(&err);
                tracing::debug!(%status, "accept failed");
                self.fire_accept(listener, Err(status));
            }
        }
    }

    /// Registers an accepted stream as a new client socket.
    fn adopt_stream(
        &mut self,
        stream: TcpStream,
        remote: SocketAddr,
    ) -> Result<SocketHandle, Status> {
        map_io(stream.set_nonblocking(true))?;
        let entry = SocketEntry::new_stream(stream, Some(remote));
        let raw = entry.io.raw();

        let handle = self.registry.insert(entry);
        if let Err(err) =
            self.backend
                .register(raw, handle.to_token(), SourceKind::Stream, Interest::NONE)
        {
            self.registry.remove(handle);
            return Err(Status::from_io(&err));
        }
        tracing::debug!(%remote, "accepted connection");
        Ok(handle)
    }

    /// One native read into the pending buffer. Positive reads deliver and
    /// disarm; a zero stream read means the peer closed.
    fn do_receive(&mut self, handle: SocketHandle) {
        let (kind, outcome) = {
            let Some(entry) = self.registry.get_mut(handle) else {
                return;
            };
            let kind = entry.kind;
            let Some(buf) = entry.recv.as_mut() else {
                return;
            };
            let outcome = match &entry.io {
                SocketIo::Listener(_) => return,
                SocketIo::Stream(stream) => (&*stream).read(buf.storage_mut()).map(|n| (n, None)),
                SocketIo::Udp(udp) => udp
                    .recv_from(buf.storage_mut())
                    .map(|(n, from)| (n, Some(from))),
            };
            (kind, outcome)
        };

        match outcome {
            // A zero stream read is the peer's close; a zero datagram is
            // an ordinary empty datagram.
            Ok((0, None)) if kind == SocketKind::TcpClient => {
                self.close_internal(handle, Status::Terminate);
            }
            Ok((n, from)) => {
                let (buf, remote) = {
                    let Some(entry) = self.registry.get_mut(handle) else {
                        return;
                    };
                    let Some(mut buf) = entry.recv.take() else {
                        return;
                    };
                    buf.set_len(n);
                    if let Some(addr) = from {
                        entry.remote = Some(addr);
                    }
                    (buf, entry.remote)
                };
                if let Err(status) = self.sync_interest(handle) {
                    tracing::warn!(%status, "disarming read interest failed");
                }
                self.fire_receive(handle, remote, buf, Status::Ok);
            }
            Err(err) if is_transient(&err) => {}
            Err(err) => {
                self.close_internal(handle, Status::from_io(&err));
            }
        }
    }

    /// One native write of the unflushed tail. Completion disarms write
    /// interest and fires the send-complete callback; a write error reports
    /// the failure through that callback before the close callback runs.
    fn do_send(&mut self, handle: SocketHandle) {
        let outcome = {
            let Some(entry) = self.registry.get_mut(handle) else {
                return;
            };
            let Some(pending) = entry.send.as_mut() else {
                return;
            };
            let tail = &pending.buf.as_slice()[pending.offset..];
            match &entry.io {
                SocketIo::Listener(_) => return,
                SocketIo::Stream(stream) => (&*stream).write(tail),
                SocketIo::Udp(udp) => match entry.remote {
                    Some(remote) => udp.send_to(tail, remote),
                    None => return,
                },
            }
        };

        match outcome {
            Ok(n) => {
                let finished = {
                    let Some(entry) = self.registry.get_mut(handle) else {
                        return;
                    };
                    let Some(pending) = entry.send.as_mut() else {
                        return;
                    };
                    pending.offset += n;
                    if pending.offset >= pending.buf.len() {
                        entry.send.take().map(|pending| pending.buf)
                    } else {
                        None
                    }
                };
                if let Some(buf) = finished {
                    if let Err(status) = self.sync_interest(handle) {
                        tracing::warn!(%status, "disarming write interest failed");
                    }
                    self.fire_sent(handle, buf, Status::Ok);
                }
            }
            Err(err) if is_transient(&err) => {}
            Err(err) => {
                let status = Status::from_io(&err);
                let buf = self
                    .registry
                    .get_mut(handle)
                    .and_then(|entry| entry.send.take())
                    .map(|pending| pending.buf);
                if let Some(buf) = buf {
                    self.fire_sent(handle, buf, status);
                }
                if self.registry.get(handle).is_some() {
                    self.close_internal(handle, status);
                }
            }
        }
    }

    /// Re-arms multiplexer interest to match the socket's pending work:
    /// listeners always read, others read while a receive is armed and
    /// write while a send is pending. Level-triggered backends never spin
    /// on idle sockets this way.
    fn sync_interest(&mut self, handle: SocketHandle) -> Result<(), Status> {
        let Some(entry) = self.registry.get_mut(handle) else {
            return Ok(());
        };
        let want = match entry.kind {
            SocketKind::TcpListener => Interest::READABLE,
            SocketKind::TcpClient | SocketKind::Udp => {
                let mut want = Interest::NONE;
                if entry.recv.is_some() {
                    want = want | Interest::READABLE;
                }
                if entry.send.is_some() {
                    want = want | Interest::WRITABLE;
                }
                want
            }
        };
        if want == entry.interest {
            return Ok(());
        }
        map_io(self
            .backend
            .reregister(entry.io.raw(), handle.to_token(), want))?;
        entry.interest = want;
        Ok(())
    }

    /// Removes the entry, deregisters it, and fires its close callback with
    /// `status`. No-op for stale handles; pending buffers drop with the
    /// entry.
    fn close_internal(&mut self, handle: SocketHandle, status: Status) {
        let Some(mut entry) = self.registry.remove(handle) else {
            return;
        };
        if let Err(err) = self.backend.deregister(entry.io.raw(), handle.to_token()) {
            tracing::warn!(error = %err, "deregistering closed socket failed");
        }
        tracing::debug!(
            kind = ?entry.kind,
            %status,
            lived = ?entry.opened_at.elapsed(),
            "socket closed"
        );

        if let Some(mut cb) = entry.callbacks.on_close.take() {
            cb(self, handle, status);
        }
    }

    fn fire_loop_event(&mut self, event: LoopEvent, status: Status) {
        if let Some(mut cb) = self.event_cb.take() {
            cb(self, event, status);
            // Restore unless the callback installed a replacement.
            if self.event_cb.is_none() {
                self.event_cb = Some(cb);
            }
        }
    }

    fn fire_accept(
        &mut self,
        listener: SocketHandle,
        result: Result<SocketHandle, Status>,
    ) {
        let Some(mut cb) = self
            .registry
            .get_mut(listener)
            .and_then(|entry| entry.callbacks.on_accept.take())
        else {
            // Nobody to hand the client to; release it.
            if let Ok(orphan) = result {
                self.close_internal(orphan, Status::Terminate);
            }
            return;
        };
        cb(self, listener, result);
        if let Some(entry) = self.registry.get_mut(listener) {
            if entry.callbacks.on_accept.is_none() {
                entry.callbacks.on_accept = Some(cb);
            }
        }
    }

    fn fire_receive(
        &mut self,
        handle: SocketHandle,
        remote: Option<SocketAddr>,
        buf: Buffer,
        status: Status,
    ) {
        let Some(mut cb) = self
            .registry
            .get_mut(handle)
            .and_then(|entry| entry.callbacks.on_receive.take())
        else {
            return;
        };
        cb(self, handle, remote, buf, status);
        if let Some(entry) = self.registry.get_mut(handle) {
            if entry.callbacks.on_receive.is_none() {
                entry.callbacks.on_receive = Some(cb);
            }
        }
    }

    fn fire_sent(&mut self, handle: SocketHandle, buf: Buffer, status: Status) {
        let Some(mut cb) = self
            .registry
            .get_mut(handle)
            .and_then(|entry| entry.callbacks.on_sent.take())
        else {
            return;
        };
        cb(self, handle, buf, status);
        if let Some(entry) = self.registry.get_mut(handle) {
            if entry.callbacks.on_sent.is_none() {
                entry.callbacks.on_sent = Some(cb);
            }
        }
    }

    fn fire_tick(&mut self, handle: SocketHandle) {
        let Some(mut cb) = self
            .registry
            .get_mut(handle)
            .and_then(|entry| entry.callbacks.on_tick.take())
        else {
            return;
        };
        cb(self, handle);
        if let Some(entry) = self.registry.get_mut(handle) {
            if entry.callbacks.on_tick.is_none() {
                entry.callbacks.on_tick = Some(cb);
            }
        }
    }
}

fn map_io<T>(result: io::Result<T>) -> Result<T, Status> {
    result.map_err(|err| Status::from_io(&err))
}

/// Would-block and signal interruption are absorbed by the loop, never
/// surfaced.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
