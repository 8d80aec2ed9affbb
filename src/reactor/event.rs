//! Readiness-wait plumbing over `poll(2)`.
//!
//! A [`WaitSet`] is the dispatcher's answer to "what should the next wait look
//! at": every watched descriptor for readability, the ones with queued output
//! for writability, and a timeout derived from the earliest timer. After
//! [`WaitSet::wait`] returns, [`WaitSet::ready`] reports what the kernel
//! flagged.

use libc::{
    F_GETFL, F_SETFL, O_NONBLOCK, POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, c_int, fcntl,
    nfds_t, poll, pollfd, read, write,
};
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// How long the next readiness wait may block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Timeout {
    /// No timer is pending: block until a descriptor is ready.
    Never,
    /// The earliest timer is already due: do not block at all.
    Expired,
    /// The earliest timer is due after this much time.
    After(Duration),
}

impl Timeout {
    fn as_millis(self) -> c_int {
        match self {
            Timeout::Never => -1,
            Timeout::Expired => 0,
            // Round up so the wait never ends before the timer is due. Longer
            // waits are capped; the loop waits again until the deadline.
            Timeout::After(duration) => {
                let millis = duration.as_nanos().div_ceil(1_000_000);
                millis.min(c_int::MAX as u128) as c_int
            }
        }
    }
}

/// Readiness reported for one descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Readiness {
    pub file_descriptor: RawFd,
    pub readable: bool,
    pub writable: bool,
    /// The descriptor is not open.
    pub invalid: bool,
}

/// Inputs and outputs of one readiness wait.
#[derive(Debug)]
pub struct WaitSet {
    fds: Vec<pollfd>,
    timeout: Timeout,
}

impl WaitSet {
    pub(crate) fn new(timeout: Timeout) -> Self {
        Self {
            fds: Vec::new(),
            timeout,
        }
    }

    pub(crate) fn add(&mut self, file_descriptor: RawFd, writable: bool) {
        let mut events = POLLIN;
        if writable {
            events |= POLLOUT;
        }

        self.fds.push(pollfd {
            fd: file_descriptor,
            events,
            revents: 0,
        });
    }

    /// Descriptors tested for readability.
    pub fn readable(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.fds
            .iter()
            .filter(|entry| entry.events & POLLIN != 0)
            .map(|entry| entry.fd)
    }

    /// Descriptors tested for writability.
    pub fn writable(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.fds
            .iter()
            .filter(|entry| entry.events & POLLOUT != 0)
            .map(|entry| entry.fd)
    }

    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    /// `true` if there is nothing to wait for: no descriptors and no timer.
    pub fn is_empty(&self) -> bool {
        self.fds.is_empty() && self.timeout == Timeout::Never
    }

    /// Blocks until a descriptor is ready or the timeout elapses. Returns the
    /// number of descriptors with readiness to report, 0 on timeout.
    pub fn wait(&mut self) -> io::Result<usize> {
        for entry in &mut self.fds {
            entry.revents = 0;
        }

        let result = unsafe {
            poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as nfds_t,
                self.timeout.as_millis(),
            )
        };

        if result < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(result as usize)
    }

    /// Descriptors flagged by the last [`wait`](Self::wait), in ascending
    /// descriptor order.
    pub fn ready(&self) -> impl Iterator<Item = Readiness> + '_ {
        self.fds
            .iter()
            .filter(|entry| entry.revents != 0)
            .map(|entry| Readiness {
                file_descriptor: entry.fd,
                readable: entry.revents & (POLLIN | POLLHUP | POLLERR) != 0,
                writable: entry.events & POLLOUT != 0
                    && entry.revents & (POLLOUT | POLLHUP | POLLERR) != 0,
                invalid: entry.revents & POLLNVAL != 0,
            })
    }

    #[cfg(test)]
    pub(crate) fn flag(&mut self, file_descriptor: RawFd, revents: libc::c_short) {
        for entry in &mut self.fds {
            if entry.fd == file_descriptor {
                entry.revents = revents;
            }
        }
    }
}

/// `true` for conditions that only mean "try again later".
pub(crate) fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// One `read(2)`, retried while interrupted.
pub(crate) fn read_some(file_descriptor: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    loop {
        let result = unsafe { read(file_descriptor, buffer.as_mut_ptr() as *mut _, buffer.len()) };

        if result >= 0 {
            return Ok(result as usize);
        }

        let error = io::Error::last_os_error();
        if error.kind() != io::ErrorKind::Interrupted {
            return Err(error);
        }
    }
}

/// One `write(2)`, retried while interrupted.
pub(crate) fn write_some(file_descriptor: RawFd, buffer: &[u8]) -> io::Result<usize> {
    loop {
        let result = unsafe { write(file_descriptor, buffer.as_ptr() as *const _, buffer.len()) };

        if result >= 0 {
            return Ok(result as usize);
        }

        let error = io::Error::last_os_error();
        if error.kind() != io::ErrorKind::Interrupted {
            return Err(error);
        }
    }
}

/// Puts `file_descriptor` in non-blocking mode.
pub fn set_nonblocking(file_descriptor: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(file_descriptor, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { fcntl(file_descriptor, F_SETFL, flags | O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}
