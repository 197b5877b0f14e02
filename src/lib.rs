//! Cross-platform callback-driven socket engine.
//!
//! One [`Proactor`] owns one event loop and every socket opened through it.
//! Applications open TCP listeners, TCP clients, and UDP sockets, install
//! callbacks, and arm at most one receive and one send per socket; the loop
//! multiplexes all of them on a single thread and reports completions
//! through the callbacks. Underneath sits level-triggered readiness polling
//! (epoll on Linux, kqueue on the BSDs and macOS) or an I/O completion port
//! adapted to readiness semantics on Windows; the engine itself never
//! learns which.
//!
//! Callbacks receive `&mut Proactor` and may open and close sockets, start
//! operations, and stop the loop from inside the event they are handling.
//! The proactor is not `Send`: it is created, driven, and disposed on one
//! thread, and other threads interact only through the cloneable
//! [`ProactorHandle`] (stop and wake). Scaling out means one proactor per
//! thread.
//!
//! # Quick start
//!
//! A single-threaded TCP echo server:
//!
//! ```no_run
//! use std::time::Duration;
//! use proactor_net::{Buffer, Proactor, SocketKind, Status};
//!
//! fn main() -> Result<(), Status> {
//!     let mut proactor = Proactor::new(Duration::from_millis(100))?;
//!     let listener = proactor.open(SocketKind::TcpListener, "127.0.0.1", 4840)?;
//!
//!     proactor.set_accept_callback(listener, |p, _listener, accepted| {
//!         let Ok(client) = accepted else { return };
//!         let _ = p.set_receive_callback(client, |p, client, _from, data, status| {
//!             if status == Status::Ok {
//!                 let _ = p.start_send(client, data);
//!             }
//!         });
//!         let _ = p.set_sent_callback(client, |p, client, _data, status| {
//!             if status == Status::Ok {
//!                 let _ = p.start_receive(client, Buffer::with_capacity(4096));
//!             }
//!         });
//!         let _ = p.start_receive(client, Buffer::with_capacity(4096));
//!     })?;
//!
//!     proactor.run();
//!     Ok(())
//! }
//! ```
//!
//! Status codes are the crate's error currency: every fallible call returns
//! `Result<_, Status>` and every completion callback carries the [`Status`]
//! of the underlying operation. Logging goes through [`tracing`]; install
//! whatever subscriber and filter the application wants.

mod backend;
mod buffer;
mod proactor;
mod registry;
mod socket;
mod status;
mod wire;

pub use buffer::Buffer;
pub use proactor::{EventCallback, LoopEvent, Proactor, ProactorHandle};
pub use registry::SocketHandle;
pub use socket::{
    AcceptCallback, CloseCallback, ReceiveCallback, SentCallback, SocketKind, TickCallback,
};
pub use status::Status;
pub use wire::EnvelopeHeader;
