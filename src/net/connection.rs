use crate::net::utils::close;

use std::os::unix::io::RawFd;

/// Lifecycle of a managed socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Obtained from accept or connect, not yet registered with the loop.
    ///
    /// A connection only passes through this state while the server sets it
    /// up, so [`NetworkServer::connection_state`] never reports it.
    ///
    /// [`NetworkServer::connection_state`]: crate::NetworkServer::connection_state
    Pending,
    /// Registered; inbound bytes accumulate in the incoming buffer.
    Open,
    /// Unregistered, descriptor closed, buffer released.
    Closed,
}

/// A socket owned by the network server and the bytes read from it that the
/// consumer has not discarded yet.
#[derive(Debug)]
pub(crate) struct Connection {
    file_descriptor: RawFd,
    state: ConnectionState,
    incoming: Vec<u8>,
}

impl Connection {
    pub(crate) fn new(file_descriptor: RawFd) -> Self {
        Self {
            file_descriptor,
            state: ConnectionState::Pending,
            incoming: Vec::new(),
        }
    }

    pub(crate) fn open(&mut self) {
        self.state = ConnectionState::Open;
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn incoming(&self) -> &[u8] {
        &self.incoming
    }

    pub(crate) fn receive(&mut self, data: &[u8]) {
        self.incoming.extend_from_slice(data);
    }

    /// Drops the first `length` incoming bytes, or all of them if fewer are
    /// buffered.
    pub(crate) fn discard(&mut self, length: usize) {
        let length = length.min(self.incoming.len());
        self.incoming.drain(..length);
    }

    /// Closes the descriptor and releases the buffer. Returns the number of
    /// incoming bytes that were never discarded.
    pub(crate) fn close(self) -> usize {
        close(self.file_descriptor);

        self.incoming.len()
    }
}
