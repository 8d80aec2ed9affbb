#![allow(dead_code)]

use netdispatch::ContractViolation;
use netdispatch::reactor::event::set_nonblocking;

use std::os::unix::io::RawFd;
use std::panic::{self, AssertUnwindSafe};

/// Routes crate diagnostics to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// Returns `(read_end, write_end)` of a fresh non-blocking pipe.
pub fn pipe() -> (RawFd, RawFd) {
    let mut fds = [0 as RawFd; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(ret, 0, "pipe: {}", std::io::Error::last_os_error());

    set_nonblocking(fds[0]).expect("non-blocking read end");
    set_nonblocking(fds[1]).expect("non-blocking write end");

    (fds[0], fds[1])
}

pub fn close(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

/// Reads everything currently available on a non-blocking `fd` into `out`.
/// Returns `false` once the writer has gone away.
pub fn drain(fd: RawFd, out: &mut Vec<u8>) -> bool {
    let mut buf = [0u8; 4096];

    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };

        match n {
            0 => return false,
            n if n > 0 => out.extend_from_slice(&buf[..n as usize]),
            _ => return true,
        }
    }
}

/// Runs `f`, which must trip a contract violation, and returns it.
pub fn violation<F: FnOnce()>(f: F) -> ContractViolation {
    let payload =
        panic::catch_unwind(AssertUnwindSafe(f)).expect_err("expected a contract violation");

    match payload.downcast::<ContractViolation>() {
        Ok(violation) => *violation,
        Err(_) => panic!("panicked with something other than a contract violation"),
    }
}
