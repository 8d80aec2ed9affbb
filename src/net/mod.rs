//! TCP networking on top of the reactor.
//!
//! - [`server`]: [`NetworkServer`](server::NetworkServer), which manages
//!   sockets as connections with buffered input and lifecycle callbacks
//! - [`connection`]: connection states
//! - [`tcp_listener`]: opening listening sockets and accepting from them
//! - [`tcp_stream`]: outbound connections and blocking fixed-count transfers
//!
//! The primitives work on raw descriptors and can be used without a server.
//!
//! # Example
//!
//! ```no_run
//! use netdispatch::net::{tcp_listener, tcp_stream};
//!
//! let listen_fd = tcp_listener::listen(Some("127.0.0.1"), 0, 5)?;
//! let port = tcp_listener::local_port(listen_fd)?;
//!
//! let client_fd = tcp_stream::connect("127.0.0.1", port)?;
//! let server_fd = tcp_listener::accept(listen_fd)?;
//!
//! tcp_stream::write_full(client_fd, b"ping")?;
//!
//! let mut reply = [0u8; 4];
//! tcp_stream::read_full(server_fd, &mut reply)?;
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod connection;
pub mod server;
pub mod tcp_listener;
pub mod tcp_stream;
pub(crate) mod utils;
