use libc::{
    AF_INET, AF_INET6, FD_CLOEXEC, F_SETFD, SO_REUSEADDR, SOCK_STREAM, SOL_SOCKET, c_int, c_short,
    c_void, fcntl, in_addr, poll, pollfd, sa_family_t, setsockopt, sockaddr_in, sockaddr_in6,
    sockaddr_storage, socket, socklen_t,
};

use std::io;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::os::unix::io::RawFd;
use std::ptr;

/// Resolves `host` and `port` to every address they name. `None` stands for
/// all IPv4 interfaces.
pub(crate) fn resolve(host: Option<&str>, port: u16) -> io::Result<Vec<SocketAddr>> {
    let addresses: Vec<SocketAddr> = match host {
        None => vec![SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))],
        Some(host) => (host, port).to_socket_addrs()?.collect(),
    };

    if addresses.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "host name resolved to no addresses",
        ));
    }

    Ok(addresses)
}

pub(crate) fn socketaddr_to_raw(address: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    let length = match address {
        SocketAddr::V4(v4) => {
            let mut raw: sockaddr_in = unsafe { mem::zeroed() };
            raw.sin_family = AF_INET as sa_family_t;
            raw.sin_port = v4.port().to_be();
            raw.sin_addr = in_addr {
                s_addr: u32::from_ne_bytes(v4.ip().octets()),
            };

            unsafe { ptr::write(&mut storage as *mut _ as *mut sockaddr_in, raw) };

            mem::size_of::<sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let mut raw: sockaddr_in6 = unsafe { mem::zeroed() };
            raw.sin6_family = AF_INET6 as sa_family_t;
            raw.sin6_port = v6.port().to_be();
            raw.sin6_flowinfo = v6.flowinfo();
            raw.sin6_addr.s6_addr = v6.ip().octets();
            raw.sin6_scope_id = v6.scope_id();

            unsafe { ptr::write(&mut storage as *mut _ as *mut sockaddr_in6, raw) };

            mem::size_of::<sockaddr_in6>()
        }
    };

    (storage, length as socklen_t)
}

pub(crate) fn raw_to_socketaddr(storage: &sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as i32 {
        AF_INET => {
            let raw = unsafe { &*(storage as *const _ as *const sockaddr_in) };
            let ip = Ipv4Addr::from(raw.sin_addr.s_addr.to_ne_bytes());

            Ok(SocketAddr::from((ip, u16::from_be(raw.sin_port))))
        }
        AF_INET6 => {
            let raw = unsafe { &*(storage as *const _ as *const sockaddr_in6) };
            let ip = Ipv6Addr::from(raw.sin6_addr.s6_addr);

            Ok(SocketAddr::from((ip, u16::from_be(raw.sin6_port))))
        }
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unsupported address family",
        )),
    }
}

/// Creates a TCP socket for `address`'s family with `SO_REUSEADDR` set and
/// close-on-exec enabled.
pub(crate) fn tcp_socket(address: &SocketAddr) -> io::Result<RawFd> {
    let domain = match address {
        SocketAddr::V4(_) => AF_INET,
        SocketAddr::V6(_) => AF_INET6,
    };

    let file_descriptor = unsafe { socket(domain, SOCK_STREAM, 0) };
    if file_descriptor < 0 {
        return Err(io::Error::last_os_error());
    }

    let one: c_int = 1;
    let configured = unsafe {
        fcntl(file_descriptor, F_SETFD, FD_CLOEXEC) == 0
            && setsockopt(
                file_descriptor,
                SOL_SOCKET,
                SO_REUSEADDR,
                &one as *const c_int as *const c_void,
                mem::size_of::<c_int>() as socklen_t,
            ) == 0
    };

    if !configured {
        let error = io::Error::last_os_error();
        close(file_descriptor);
        return Err(error);
    }

    Ok(file_descriptor)
}

/// Blocks until `file_descriptor` reports one of `events`.
pub(crate) fn wait_for(file_descriptor: RawFd, events: c_short) -> io::Result<()> {
    let mut entry = pollfd {
        fd: file_descriptor,
        events,
        revents: 0,
    };

    loop {
        if unsafe { poll(&mut entry, 1, -1) } >= 0 {
            return Ok(());
        }

        let error = io::Error::last_os_error();
        if error.kind() != io::ErrorKind::Interrupted {
            return Err(error);
        }
    }
}

pub(crate) fn close(file_descriptor: RawFd) {
    unsafe {
        libc::close(file_descriptor);
    }
}
