//! Socket kinds, per-socket state, and native socket setup.
//!
//! A [`SocketEntry`] is the registry's record of one live socket: the
//! native socket itself, the remote address when one is known, the
//! currently-armed multiplexer interest, at most one pending receive and
//! one pending send, and the application's callbacks. Entries are owned
//! exclusively by the registry; applications interact through
//! [`SocketHandle`](crate::SocketHandle) only.
//!
//! Native setup (create/bind/listen/connect) happens here through
//! `socket2`, synchronously on the calling thread; the socket is switched
//! to nonblocking before it is handed to the event loop.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::str::FromStr;
use std::time::Instant;

use socket2::{Domain, Protocol, Socket, Type};

use crate::backend::{Interest, RawSource};
use crate::buffer::Buffer;
use crate::proactor::Proactor;
use crate::registry::SocketHandle;
use crate::status::Status;

/// Listen backlog for new listener sockets.
const LISTEN_BACKLOG: i32 = 128;

/// The kind of socket an [`open`](crate::Proactor::open) call produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketKind {
    /// Listening TCP socket producing new clients through the accept
    /// callback.
    TcpListener,
    /// Connected TCP socket (opened locally or produced by an accept).
    TcpClient,
    /// UDP socket bound to a local address.
    Udp,
}

/// Callback invoked when a listener accepts (or fails to accept) a peer.
pub type AcceptCallback =
    Box<dyn FnMut(&mut Proactor, SocketHandle, Result<SocketHandle, Status>)>;
/// Callback invoked exactly once when a socket reaches its end of life.
pub type CloseCallback = Box<dyn FnMut(&mut Proactor, SocketHandle, Status)>;
/// Callback invoked when a pending receive completes.
pub type ReceiveCallback =
    Box<dyn FnMut(&mut Proactor, SocketHandle, Option<SocketAddr>, Buffer, Status)>;
/// Callback invoked when a pending send has been fully flushed or failed.
pub type SentCallback = Box<dyn FnMut(&mut Proactor, SocketHandle, Buffer, Status)>;
/// Callback invoked once per loop iteration for each socket that set one.
pub type TickCallback = Box<dyn FnMut(&mut Proactor, SocketHandle)>;

/// Per-socket callback registration slots; a setter overwrites its slot.
#[derive(Default)]
pub(crate) struct Callbacks {
    pub on_accept: Option<AcceptCallback>,
    pub on_close: Option<CloseCallback>,
    pub on_receive: Option<ReceiveCallback>,
    pub on_sent: Option<SentCallback>,
    pub on_tick: Option<TickCallback>,
}

/// The native socket held by an entry.
#[derive(Debug)]
pub(crate) enum SocketIo {
    Listener(TcpListener),
    Stream(TcpStream),
    Udp(UdpSocket),
}

impl SocketIo {
    #[cfg(unix)]
    pub fn raw(&self) -> RawSource {
        use std::os::fd::AsRawFd;
        match self {
            Self::Listener(s) => s.as_raw_fd(),
            Self::Stream(s) => s.as_raw_fd(),
            Self::Udp(s) => s.as_raw_fd(),
        }
    }

    #[cfg(windows)]
    pub fn raw(&self) -> RawSource {
        use std::os::windows::io::AsRawSocket;
        match self {
            Self::Listener(s) => s.as_raw_socket(),
            Self::Stream(s) => s.as_raw_socket(),
            Self::Udp(s) => s.as_raw_socket(),
        }
    }
}

/// An in-flight send: the buffer plus how much of it has been flushed.
pub(crate) struct PendingSend {
    pub buf: Buffer,
    pub offset: usize,
}

/// One live socket as recorded in the registry.
pub(crate) struct SocketEntry {
    pub kind: SocketKind,
    pub io: SocketIo,
    pub remote: Option<SocketAddr>,
    /// Interest currently armed with the multiplexer.
    pub interest: Interest,
    pub recv: Option<Buffer>,
    pub send: Option<PendingSend>,
    pub callbacks: Callbacks,
    pub opened_at: Instant,
}

impl SocketEntry {
    pub fn new_listener(listener: TcpListener) -> Self {
        Self {
            kind: SocketKind::TcpListener,
            io: SocketIo::Listener(listener),
            remote: None,
            interest: Interest::NONE,
            recv: None,
            send: None,
            callbacks: Callbacks::default(),
            opened_at: Instant::now(),
        }
    }

    pub fn new_stream(stream: TcpStream, remote: Option<SocketAddr>) -> Self {
        Self {
            kind: SocketKind::TcpClient,
            io: SocketIo::Stream(stream),
            remote,
            interest: Interest::NONE,
            recv: None,
            send: None,
            callbacks: Callbacks::default(),
            opened_at: Instant::now(),
        }
    }

    pub fn new_udp(socket: UdpSocket) -> Self {
        Self {
            kind: SocketKind::Udp,
            io: SocketIo::Udp(socket),
            remote: None,
            interest: Interest::NONE,
            recv: None,
            send: None,
            callbacks: Callbacks::default(),
            opened_at: Instant::now(),
        }
    }
}

/// Parses the open-call address string.
///
/// An empty address means "any" (the IPv4 unspecified address); otherwise
/// the string must be an IPv4 or IPv6 literal.
///
/// # Errors
///
/// [`Status::BadInput`] for anything that is not a literal address.
pub(crate) fn parse_address(address: &str, port: u16) -> Result<SocketAddr, Status> {
    if address.is_empty() {
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    let ip = std::net::IpAddr::from_str(address).map_err(|_| Status::BadInput)?;
    Ok(SocketAddr::new(ip, port))
}

fn new_socket(addr: SocketAddr, ty: Type, protocol: Protocol) -> io::Result<Socket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    Socket::new(domain, ty, Some(protocol))
}

/// Binds and starts a listener at `addr`, nonblocking.
pub(crate) fn open_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = new_socket(addr, Type::STREAM, Protocol::TCP)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Connects to `addr` (blocking, on the calling thread), then switches the
/// stream to nonblocking.
pub(crate) fn open_client(addr: SocketAddr) -> io::Result<TcpStream> {
    let socket = new_socket(addr, Type::STREAM, Protocol::TCP)?;
    socket.connect(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Binds a UDP socket at `addr` (port zero for an ephemeral port),
/// nonblocking.
pub(crate) fn open_udp(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = new_socket(addr, Type::DGRAM, Protocol::UDP)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}
