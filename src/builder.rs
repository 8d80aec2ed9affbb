//! Fluent builders for dispatchers and network servers.
//!
//! Both builders take the [`tracing::Span`] the event loop logs under, so an
//! application can route each loop's diagnostics wherever it wants.
//!
//! # Example
//! ```
//! use netdispatch::ServerBuilder;
//!
//! let server = ServerBuilder::new()
//!     .span(tracing::info_span!("echo"))
//!     .read_chunk(4096)
//!     .build();
//! ```

use crate::net::server::NetworkServer;
use crate::reactor::core::Core;
use crate::reactor::dispatcher::Dispatcher;

use tracing::Span;

/// Bytes requested from the kernel per read on a connection.
pub const DEFAULT_READ_CHUNK: usize = 9000;

/// Pending-connection queue length of listening sockets.
pub const DEFAULT_BACKLOG: i32 = 5;

/// Builder for [`Dispatcher`].
#[derive(Debug, Default)]
pub struct DispatcherBuilder {
    span: Option<Span>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self { span: None }
    }

    /// Logs under `span` instead of a `dispatcher` debug span.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Dispatcher {
        let span = self
            .span
            .unwrap_or_else(|| tracing::debug_span!("dispatcher"));

        Dispatcher::with_core(Core::new(span))
    }
}

/// Builder for [`NetworkServer`].
#[derive(Debug)]
pub struct ServerBuilder {
    span: Option<Span>,
    read_chunk: usize,
    backlog: i32,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            span: None,
            read_chunk: DEFAULT_READ_CHUNK,
            backlog: DEFAULT_BACKLOG,
        }
    }

    /// Logs under `span` instead of a `network_server` debug span.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Upper bound on the bytes taken from a connection per readable event.
    /// Zero is raised to one.
    pub fn read_chunk(mut self, bytes: usize) -> Self {
        self.read_chunk = bytes.max(1);
        self
    }

    /// Backlog passed to `listen(2)` for sockets opened with
    /// [`NetworkServer::listen`].
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn build(self) -> NetworkServer {
        let span = self
            .span
            .unwrap_or_else(|| tracing::debug_span!("network_server"));

        NetworkServer::with_config(Core::new(span), self.read_chunk, self.backlog)
    }
}
