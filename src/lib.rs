//! Single-threaded, callback-driven I/O reactor.
//!
//! The crate multiplexes file descriptors and timers on one thread with
//! `poll(2)`:
//!
//! - **Dispatcher**: watches descriptors for readability, writes queued
//!   output without blocking and fires timers in due-time order
//! - **NetworkServer**: the same loop, managing TCP sockets as connections
//!   with per-connection input buffers and connect/data/disconnect/error
//!   callbacks
//! - **EventLoop**: the trait both implement; callbacks receive the loop
//!   itself and may change any registration while it runs
//! - **Builders**: configure the logging span and server tunables
//!
//! Diagnostics go through [`tracing`]. Misuse such as writing to a
//! descriptor that is not watched panics with a [`ContractViolation`]
//! payload; runtime failures come back as [`std::io::Error`].
//!
//! # Example
//!
//! ```no_run
//! use netdispatch::{Dispatcher, EventLoop, TimerCallback, time};
//!
//! let mut dispatcher = Dispatcher::new();
//!
//! let tick = TimerCallback::new(|_: &mut Dispatcher, due| println!("tick at {due}"));
//! dispatcher.on_time(time::now() + 0.5, &tick);
//!
//! dispatcher.run()?;
//! # Ok::<(), std::io::Error>(())
//! ```

mod builder;
pub mod error;
pub mod net;
pub mod reactor;
pub mod time;

pub use builder::{DEFAULT_BACKLOG, DEFAULT_READ_CHUNK, DispatcherBuilder, ServerBuilder};
pub use error::ContractViolation;
pub use net::connection::ConnectionState;
pub use net::server::NetworkServer;
pub use reactor::core::{Core, EventLoop, Iteration};
pub use reactor::dispatcher::Dispatcher;
pub use reactor::event::{Readiness, Timeout, WaitSet};
pub use reactor::timer::TimerCallback;
