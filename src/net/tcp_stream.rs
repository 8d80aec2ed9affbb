//! Outbound connections and fixed-count blocking transfers.

use crate::net::utils::{
    close, raw_to_socketaddr, resolve, socketaddr_to_raw, tcp_socket, wait_for,
};
use crate::reactor::event::{read_some, write_some};

use libc::{
    POLLIN, POLLOUT, SO_ERROR, SOL_SOCKET, c_int, c_void, getpeername, getsockopt, sockaddr,
    sockaddr_storage, socklen_t,
};
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;

/// Connects to `port` on `host` and returns the connected descriptor.
///
/// Every address `host` resolves to is tried in turn.
///
/// # Arguments
/// * `host` - Host name or address of the peer
/// * `port` - Port of the peer
///
/// # Returns
/// A blocking, connected descriptor, or the error of the last attempt if no
/// address accepts
pub fn connect(host: &str, port: u16) -> io::Result<RawFd> {
    let mut last_error = None;

    for address in resolve(Some(host), port)? {
        match connect_to(&address) {
            Ok(file_descriptor) => return Ok(file_descriptor),
            Err(error) => last_error = Some(error),
        }
    }

    Err(last_error
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address to connect to")))
}

fn connect_to(address: &SocketAddr) -> io::Result<RawFd> {
    let file_descriptor = tcp_socket(address)?;
    let (raw, length) = socketaddr_to_raw(address);

    let ret =
        unsafe { libc::connect(file_descriptor, &raw as *const _ as *const sockaddr, length) };

    let outcome = if ret == 0 {
        Ok(())
    } else {
        let error = io::Error::last_os_error();

        // An interrupted connect keeps going in the background.
        if error.kind() == io::ErrorKind::Interrupted {
            finish_connect(file_descriptor)
        } else {
            Err(error)
        }
    };

    match outcome {
        Ok(()) => Ok(file_descriptor),
        Err(error) => {
            close(file_descriptor);
            Err(error)
        }
    }
}

fn finish_connect(file_descriptor: RawFd) -> io::Result<()> {
    wait_for(file_descriptor, POLLOUT)?;

    let mut error: c_int = 0;
    let mut length = mem::size_of::<c_int>() as socklen_t;

    let ret = unsafe {
        getsockopt(
            file_descriptor,
            SOL_SOCKET,
            SO_ERROR,
            &mut error as *mut c_int as *mut c_void,
            &mut length,
        )
    };

    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    if error != 0 {
        return Err(io::Error::from_raw_os_error(error));
    }

    Ok(())
}

/// Reads from `file_descriptor` until `buffer` is full or the peer closes.
///
/// Interrupted reads are retried; on a non-blocking descriptor the call waits
/// for more input instead of failing.
///
/// # Arguments
/// * `file_descriptor` - Connected socket or other readable descriptor
/// * `buffer` - Destination, filled from the start
///
/// # Returns
/// The number of bytes read, less than `buffer.len()` only at end of stream
pub fn read_full(file_descriptor: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;

    while filled < buffer.len() {
        match read_some(file_descriptor, &mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                wait_for(file_descriptor, POLLIN)?;
            }
            Err(error) => return Err(error),
        }
    }

    Ok(filled)
}

/// Writes all of `buffer` to `file_descriptor`, blocking as needed.
///
/// # Arguments
/// * `file_descriptor` - Connected socket or other writable descriptor
/// * `buffer` - Bytes to send
///
/// # Returns
/// `buffer.len()` once everything is written, or the first genuine error
pub fn write_full(file_descriptor: RawFd, buffer: &[u8]) -> io::Result<usize> {
    let mut written = 0;

    while written < buffer.len() {
        match write_some(file_descriptor, &buffer[written..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "write returned zero bytes",
                ));
            }
            Ok(n) => written += n,
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                wait_for(file_descriptor, POLLOUT)?;
            }
            Err(error) => return Err(error),
        }
    }

    Ok(written)
}

/// Address of the peer `file_descriptor` is connected to.
pub fn peer_addr(file_descriptor: RawFd) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;

    let result = unsafe {
        getpeername(
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
