//! Callback-driven network server.
//!
//! [`NetworkServer`] sits on the same reactor as [`Dispatcher`] and manages
//! accepted and outbound TCP sockets as connections. Each connection keeps
//! every byte read from it until the consumer discards it, and the server
//! reports connection lifecycle events through four callbacks shared by all
//! connections:
//!
//! - `on_connect`: a connection was accepted on a listening socket
//! - `on_data`: bytes arrived; the callback sees everything accumulated so far
//! - `on_disconnect`: the peer closed the connection
//! - `on_error`: reading failed; the connection is already closed
//!
//! Closing a connection yourself with [`NetworkServer::disconnect`] does not
//! trigger `on_disconnect`.
//!
//! [`Dispatcher`]: crate::Dispatcher

use crate::builder::ServerBuilder;
use crate::error::{ContractViolation, fatal};
use crate::net::connection::{Connection, ConnectionState};
use crate::net::utils::close;
use crate::net::{tcp_listener, tcp_stream};
use crate::reactor::core::{Core, EventLoop};
use crate::reactor::event::{is_transient, read_some, set_nonblocking};

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::rc::Rc;

use tracing::{debug, warn};

type ConnectionCallback = Rc<RefCell<dyn FnMut(&mut NetworkServer, RawFd)>>;
type DataCallback = Rc<RefCell<dyn FnMut(&mut NetworkServer, RawFd, &[u8])>>;
type ErrorCallback = Rc<RefCell<dyn FnMut(&mut NetworkServer, RawFd, &io::Error)>>;

/// Event loop that turns sockets into connections with lifecycle callbacks.
///
/// All [`EventLoop`] operations are available as well, so timers and other
/// descriptors can share the loop with the managed connections.
///
/// # Example
///
/// ```no_run
/// use netdispatch::{EventLoop, NetworkServer};
///
/// let mut server = NetworkServer::new();
/// server.listen(Some("127.0.0.1"), 7000)?;
///
/// // Echo back every complete line.
/// server.on_data(|server, fd, data| {
///     if let Some(end) = data.iter().position(|&byte| byte == b'\n') {
///         server.write(fd, &data[..=end]);
///         server.discard(fd, end + 1);
///     }
/// });
///
/// server.run()?;
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct NetworkServer {
    core: Core<NetworkServer>,
    connections: BTreeMap<RawFd, Connection>,
    listeners: BTreeSet<RawFd>,
    on_connect: Option<ConnectionCallback>,
    on_disconnect: Option<ConnectionCallback>,
    on_data: Option<DataCallback>,
    on_error: Option<ErrorCallback>,
    read_chunk: usize,
    backlog: i32,
    scratch: Vec<u8>,
}

impl NetworkServer {
    /// Creates a server with the default configuration.
    pub fn new() -> Self {
        ServerBuilder::new().build()
    }

    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub(crate) fn with_config(core: Core<NetworkServer>, read_chunk: usize, backlog: i32) -> Self {
        Self {
            core,
            connections: BTreeMap::new(),
            listeners: BTreeSet::new(),
            on_connect: None,
            on_disconnect: None,
            on_data: None,
            on_error: None,
            read_chunk,
            backlog,
            scratch: Vec::new(),
        }
    }

    /// Opens a listening socket on `host` and `port` and returns its
    /// descriptor. Incoming connections are accepted automatically.
    ///
    /// # Arguments
    /// * `host` - Host name or address to bind, `None` for all interfaces
    /// * `port` - Port to bind, 0 for a free port ([`tcp_listener::local_port`]
    ///   reports which)
    ///
    /// # Returns
    /// The listening descriptor, or the I/O error that prevented listening
    pub fn listen(&mut self, host: Option<&str>, port: u16) -> io::Result<RawFd> {
        let listen_fd = tcp_listener::listen(host, port, self.backlog).inspect_err(|error| {
            warn!(parent: self.core.span(), ?host, port, %error, "listen failed");
        })?;

        if let Err(error) = set_nonblocking(listen_fd) {
            close(listen_fd);
            return Err(error);
        }

        self.listeners.insert(listen_fd);
        self.watch(listen_fd, Self::accept_connection);

        debug!(parent: self.core.span(), fd = listen_fd, ?host, port, "listening");

        Ok(listen_fd)
    }

    /// Connects to `port` on `host` and manages the result as a connection.
    /// `on_connect` is not called for outbound connections.
    ///
    /// # Returns
    /// The connection's descriptor, or the error of the last address tried
    pub fn connect(&mut self, host: &str, port: u16) -> io::Result<RawFd> {
        let file_descriptor = tcp_stream::connect(host, port).inspect_err(|error| {
            warn!(parent: self.core.span(), host, port, %error, "connect failed");
        })?;

        if let Err(error) = set_nonblocking(file_descriptor) {
            close(file_descriptor);
            return Err(error);
        }

        self.add_connection(file_descriptor);

        Ok(file_descriptor)
    }

    /// Calls `callback` for every accepted connection.
    pub fn on_connect<F>(&mut self, callback: F)
    where
        F: FnMut(&mut NetworkServer, RawFd) + 'static,
    {
        self.on_connect = Some(Rc::new(RefCell::new(callback)));
    }

    /// Calls `callback` when a peer closes its connection. Not called for
    /// [`disconnect`](Self::disconnect).
    pub fn on_disconnect<F>(&mut self, callback: F)
    where
        F: FnMut(&mut NetworkServer, RawFd) + 'static,
    {
        self.on_disconnect = Some(Rc::new(RefCell::new(callback)));
    }

    /// Calls `callback` after every read with all bytes received on the
    /// connection and not yet [discarded](Self::discard).
    pub fn on_data<F>(&mut self, callback: F)
    where
        F: FnMut(&mut NetworkServer, RawFd, &[u8]) + 'static,
    {
        self.on_data = Some(Rc::new(RefCell::new(callback)));
    }

    /// Calls `callback` when reading from a connection fails. The connection
    /// is closed by then.
    pub fn on_error<F>(&mut self, callback: F)
    where
        F: FnMut(&mut NetworkServer, RawFd, &io::Error) + 'static,
    {
        self.on_error = Some(Rc::new(RefCell::new(callback)));
    }

    /// Bytes received on `file_descriptor` and not yet discarded.
    #[track_caller]
    pub fn incoming(&self, file_descriptor: RawFd) -> &[u8] {
        self.connection(file_descriptor).incoming()
    }

    /// Number of bytes received on `file_descriptor` and not yet discarded.
    ///
    /// # Panics
    /// With [`ContractViolation::UnknownConnection`] if `file_descriptor` is
    /// not a live connection.
    #[track_caller]
    pub fn available(&self, file_descriptor: RawFd) -> usize {
        self.connection(file_descriptor).incoming().len()
    }

    /// Drops the first `length` bytes of the incoming buffer of
    /// `file_descriptor`, typically because they have been processed.
    #[track_caller]
    pub fn discard(&mut self, file_descriptor: RawFd, length: usize) {
        self.connection_mut(file_descriptor).discard(length);
    }

    /// Closes the connection on `file_descriptor` right away. Queued output
    /// and unread input are dropped.
    #[track_caller]
    pub fn disconnect(&mut self, file_descriptor: RawFd) {
        if !self.connections.contains_key(&file_descriptor) {
            fatal(ContractViolation::UnknownConnection(file_descriptor));
        }

        self.teardown(file_descriptor);
    }

    /// State of the connection on `file_descriptor`.
    ///
    /// # Returns
    /// [`ConnectionState::Open`] for a live connection and
    /// [`ConnectionState::Closed`] for any other descriptor, including one
    /// whose connection has been torn down.
    pub fn connection_state(&self, file_descriptor: RawFd) -> ConnectionState {
        self.connections
            .get(&file_descriptor)
            .map_or(ConnectionState::Closed, Connection::state)
    }

    /// Number of live connections, accepted and outbound.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[track_caller]
    fn connection(&self, file_descriptor: RawFd) -> &Connection {
        match self.connections.get(&file_descriptor) {
            Some(connection) => connection,
            None => fatal(ContractViolation::UnknownConnection(file_descriptor)),
        }
    }

    #[track_caller]
    fn connection_mut(&mut self, file_descriptor: RawFd) -> &mut Connection {
        match self.connections.get_mut(&file_descriptor) {
            Some(connection) => connection,
            None => fatal(ContractViolation::UnknownConnection(file_descriptor)),
        }
    }

    fn add_connection(&mut self, file_descriptor: RawFd) {
        self.connections
            .insert(file_descriptor, Connection::new(file_descriptor));

        self.watch(file_descriptor, Self::handle_data);
        self.connection_mut(file_descriptor).open();

        debug!(parent: self.core.span(), fd = file_descriptor, "connection open");
    }

    fn accept_connection(&mut self, listen_fd: RawFd) {
        let file_descriptor = match tcp_listener::accept(listen_fd) {
            Ok(file_descriptor) => file_descriptor,
            Err(error) if is_transient(&error) => return,
            Err(error) => {
                warn!(parent: self.core.span(), fd = listen_fd, %error, "accept failed");
                return;
            }
        };

        if let Err(error) = set_nonblocking(file_descriptor) {
            warn!(parent: self.core.span(), fd = file_descriptor, %error, "accepted socket unusable");
            close(file_descriptor);
            return;
        }

        self.add_connection(file_descriptor);

        if let Some(callback) = self.on_connect.clone() {
            (&mut *callback.borrow_mut())(self, file_descriptor);
        }
    }

    fn handle_data(&mut self, file_descriptor: RawFd) {
        let mut chunk = mem::take(&mut self.scratch);
        chunk.resize(self.read_chunk, 0);

        let result = read_some(file_descriptor, &mut chunk);

        if let Ok(received) = result
            && received > 0
        {
            self.connection_mut(file_descriptor)
                .receive(&chunk[..received]);
        }

        self.scratch = chunk;

        match result {
            Ok(0) => {
                debug!(parent: self.core.span(), fd = file_descriptor, "peer closed connection");

                self.teardown(file_descriptor);

                if let Some(callback) = self.on_disconnect.clone() {
                    (&mut *callback.borrow_mut())(self, file_descriptor);
                }
            }
            Ok(_) => {
                if let Some(callback) = self.on_data.clone() {
                    let data = self.incoming(file_descriptor).to_vec();
                    (&mut *callback.borrow_mut())(self, file_descriptor, &data);
                }
            }
            Err(error) if is_transient(&error) => {}
            Err(error) => {
                warn!(parent: self.core.span(), fd = file_descriptor, %error, "read failed");

                self.teardown(file_descriptor);

                if let Some(callback) = self.on_error.clone() {
                    (&mut *callback.borrow_mut())(self, file_descriptor, &error);
                }
            }
        }
    }

    /// Unregisters, closes and forgets the connection on `file_descriptor`.
    fn teardown(&mut self, file_descriptor: RawFd) {
        if self.is_watched(file_descriptor) {
            self.core.unwatch(file_descriptor);
        }

        if let Some(connection) = self.connections.remove(&file_descriptor) {
            let unread = connection.close();

            debug!(parent: self.core.span(), fd = file_descriptor, unread, "connection closed");
        }
    }
}

impl Default for NetworkServer {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop for NetworkServer {
    fn core(&self) -> &Core<Self> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut Core<Self> {
        &mut self.core
    }

    /// Queues `data` for the connection on `file_descriptor`.
    #[track_caller]
    fn write(&mut self, file_descriptor: RawFd, data: &[u8]) {
        if !self.connections.contains_key(&file_descriptor) {
            fatal(ContractViolation::UnknownConnection(file_descriptor));
        }

        self.core.enqueue(file_descriptor, data);
    }

    /// Disconnects every connection, closes every listening socket and drops
    /// all other descriptors and timers. `on_disconnect` is not called.
    fn close(&mut self) {
        let connections: Vec<RawFd> = self.connections.keys().copied().collect();
        for file_descriptor in connections {
            self.teardown(file_descriptor);
        }

        for listen_fd in mem::take(&mut self.listeners) {
            if self.is_watched(listen_fd) {
                self.core.unwatch(listen_fd);
            }

            close(listen_fd);
        }

        self.core.clear();
    }
}

impl Drop for NetworkServer {
    fn drop(&mut self) {
        EventLoop::close(self);
    }
}

impl fmt::Debug for NetworkServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkServer")
            .field("core", &self.core)
            .field("connections", &self.connections.keys().collect::<Vec<_>>())
            .field("listeners", &self.listeners)
            .field("read_chunk", &self.read_chunk)
            .finish_non_exhaustive()
    }
}
