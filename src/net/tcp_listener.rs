//! Listening sockets.
//!
//! ```no_run
//! use netdispatch::net::tcp_listener;
//!
//! let listen_fd = tcp_listener::listen(Some("127.0.0.1"), 0, 5)?;
//! println!("listening on port {}", tcp_listener::local_port(listen_fd)?);
//!
//! let client_fd = tcp_listener::accept(listen_fd)?;
//! # Ok::<(), std::io::Error>(())
//! ```

use crate::net::utils::{close, raw_to_socketaddr, resolve, socketaddr_to_raw, tcp_socket};

use libc::{
    F_SETFD, FD_CLOEXEC, accept as accept_raw, bind, fcntl, getsockname, sockaddr, sockaddr_storage,
    socklen_t,
};
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::ptr;

/// Opens a socket listening on `host` and `port` and returns its descriptor.
///
/// The socket has `SO_REUSEADDR` and close-on-exec set. A host name that
/// resolves to several addresses binds the first one.
///
/// # Arguments
/// * `host` - Host name or address to bind, `None` for all IPv4 interfaces
/// * `port` - Port to bind, 0 for a free port (see [`local_port`])
/// * `backlog` - Length of the pending-connection queue
///
/// # Returns
/// The listening descriptor, or the resolution or socket error
pub fn listen(host: Option<&str>, port: u16, backlog: i32) -> io::Result<RawFd> {
    let address = resolve(host, port)?[0];
    let file_descriptor = tcp_socket(&address)?;

    let (raw, length) = socketaddr_to_raw(&address);

    let ret = unsafe { bind(file_descriptor, &raw as *const _ as *const sockaddr, length) };
    if ret < 0 {
        let error = io::Error::last_os_error();
        close(file_descriptor);
        return Err(error);
    }

    let ret = unsafe { libc::listen(file_descriptor, backlog) };
    if ret < 0 {
        let error = io::Error::last_os_error();
        close(file_descriptor);
        return Err(error);
    }

    Ok(file_descriptor)
}

/// Accepts a pending connection on `listen_fd`, retrying while interrupted.
///
/// # Arguments
/// * `listen_fd` - A descriptor returned by [`listen`]
///
/// # Returns
/// The connected descriptor with close-on-exec set. On a non-blocking
/// listener with nothing pending this fails with
/// [`io::ErrorKind::WouldBlock`].
pub fn accept(listen_fd: RawFd) -> io::Result<RawFd> {
    loop {
        let file_descriptor = unsafe { accept_raw(listen_fd, ptr::null_mut(), ptr::null_mut()) };

        if file_descriptor >= 0 {
            unsafe { fcntl(file_descriptor, F_SETFD, FD_CLOEXEC) };
            return Ok(file_descriptor);
        }

        let error = io::Error::last_os_error();
        if error.kind() != io::ErrorKind::Interrupted {
            return Err(error);
        }
    }
}

/// Address `file_descriptor` is bound to.
pub fn local_addr(file_descriptor: RawFd) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;

    let result = unsafe {
        getsockname(
            file_descriptor,
            &mut storage as *mut _ as *mut sockaddr,
            &mut length,
        )
    };

    if result < 0 {
        return Err(io::Error::last_os_error());
    }

    raw_to_socketaddr(&storage)
}

/// Port `file_descriptor` is bound to.
pub fn local_port(file_descriptor: RawFd) -> io::Result<u16> {
    local_addr(file_descriptor).map(|address| address.port())
}
