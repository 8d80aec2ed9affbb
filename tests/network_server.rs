mod common;

use netdispatch::net::tcp_listener;
use netdispatch::{
    ConnectionState, ContractViolation, EventLoop, NetworkServer, TimerCallback, time,
};
use std::cell::{Cell, RefCell};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;
use std::thread;

fn listening_server() -> (NetworkServer, RawFd, u16) {
    let mut server = NetworkServer::builder()
        .span(tracing::info_span!("test_server"))
        .build();
    let listen_fd = server.listen(Some("127.0.0.1"), 0).expect("listen");
    let port = tcp_listener::local_port(listen_fd).expect("local port");

    (server, listen_fd, port)
}

#[test]
fn echo_round_trip() {
    common::init_tracing();
    let (mut server, _listen_fd, port) = listening_server();
    let disconnected = Rc::new(RefCell::new(Vec::new()));

    server.on_data(|server, fd, data| {
        assert_eq!(server.available(fd), data.len());
        assert_eq!(server.incoming(fd), data);

        server.write(fd, data);
        server.discard(fd, data.len());
        assert_eq!(server.available(fd), 0);
    });
    {
        let disconnected = Rc::clone(&disconnected);
        server.on_disconnect(move |server, fd| {
            assert_eq!(server.connection_state(fd), ConnectionState::Closed);
            disconnected.borrow_mut().push(fd);
            server.close();
        });
    }

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        stream.write_all(b"Hoi!").expect("write");

        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).expect("read");
        reply
    });

    server.run().expect("run");

    assert_eq!(&client.join().unwrap(), b"Hoi!");
    assert_eq!(disconnected.borrow().len(), 1);
    assert_eq!(server.connection_count(), 0);
    assert_eq!(server.fd_count(), 0);
}

#[test]
fn peer_close_reports_exactly_one_disconnect() {
    common::init_tracing();
    let (mut server, _listen_fd, port) = listening_server();
    let accepted = Rc::new(Cell::new(-1));
    let disconnects = Rc::new(RefCell::new(Vec::new()));

    {
        let accepted = Rc::clone(&accepted);
        server.on_connect(move |_, fd| accepted.set(fd));
    }
    {
        let disconnects = Rc::clone(&disconnects);
        server.on_disconnect(move |server, fd| {
            assert!(!server.is_watched(fd));
            disconnects.borrow_mut().push(fd);

            // Leave the loop running a little longer to catch repeats.
            let stop = TimerCallback::new(|server: &mut NetworkServer, _| server.close());
            server.on_time(time::now() + 0.2, &stop);
        });
    }

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        stream.write_all(b"bye").expect("write");
    });

    server.run().expect("run");
    client.join().unwrap();

    assert_ne!(accepted.get(), -1);
    assert_eq!(*disconnects.borrow(), vec![accepted.get()]);
}

#[test]
fn large_echo() {
    common::init_tracing();
    let (mut server, _listen_fd, port) = listening_server();

    server.on_data(|server, fd, data| {
        server.write(fd, data);
        server.discard(fd, data.len());
    });
    server.on_disconnect(|server, _fd| server.close());

    let payload: Vec<u8> = (0..512 * 1024).map(|i| (i % 253) as u8).collect();
    let expected = payload.clone();

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        let mut writer = stream.try_clone().expect("clone");
        let sender = thread::spawn(move || writer.write_all(&payload).expect("write"));

        let mut echoed = vec![0u8; expected.len()];
        stream.read_exact(&mut echoed).expect("read");
        sender.join().unwrap();

        echoed == expected
    });

    server.run().expect("run");

    assert!(client.join().unwrap(), "echo differs from what was sent");
}

#[test]
fn self_connected_ping_pong() {
    common::init_tracing();
    let (mut server, _listen_fd, port) = listening_server();
    let accepted = Rc::new(Cell::new(-1));
    let client_fd = Rc::new(Cell::new(-1));
    let disconnects = Rc::new(RefCell::new(Vec::new()));

    {
        let accepted = Rc::clone(&accepted);
        server.on_connect(move |server, fd| {
            assert_eq!(server.connection_state(fd), ConnectionState::Open);
            accepted.set(fd);
        });
    }
    {
        let accepted = Rc::clone(&accepted);
        let client_fd = Rc::clone(&client_fd);
        server.on_data(move |server, fd, data| {
            if fd == accepted.get() && data == b"ping" {
                server.discard(fd, 4);
                server.write(fd, b"pong");
            } else if fd == client_fd.get() && data == b"pong" {
                server.disconnect(fd);
                assert_eq!(server.connection_state(fd), ConnectionState::Closed);
            }
        });
    }
    {
        let disconnects = Rc::clone(&disconnects);
        server.on_disconnect(move |server, fd| {
            disconnects.borrow_mut().push(fd);
            server.close();
        });
    }

    let fd = server.connect("127.0.0.1", port).expect("connect");
    client_fd.set(fd);
    assert_eq!(server.connection_state(fd), ConnectionState::Open);
    server.write(fd, b"ping");

    server.run().expect("run");

    assert_ne!(accepted.get(), -1);
    assert_eq!(*disconnects.borrow(), vec![accepted.get()]);
}

#[test]
fn partial_discard_keeps_the_rest() {
    common::init_tracing();
    let (mut server, _listen_fd, port) = listening_server();
    let checked = Rc::new(Cell::new(false));

    {
        let checked = Rc::clone(&checked);
        server.on_data(move |server, fd, data| {
            if data.len() < 6 {
                return;
            }

            server.discard(fd, 2);
            assert_eq!(server.incoming(fd), b"cdef");

            server.discard(fd, 100);
            assert_eq!(server.available(fd), 0);

            checked.set(true);
            server.close();
        });
    }

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        stream.write_all(b"abcdef").expect("write");

        // Hold the connection until the server has closed it.
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });

    server.run().expect("run");
    client.join().unwrap();

    assert!(checked.get());
}

#[test]
fn connection_reset_reports_error() {
    common::init_tracing();
    let (mut server, _listen_fd, port) = listening_server();
    let error_kind = Rc::new(Cell::new(None));
    let disconnected = Rc::new(Cell::new(false));

    server.on_connect(|server, fd| server.write(fd, b"go"));
    {
        let error_kind = Rc::clone(&error_kind);
        server.on_error(move |server, fd, error: &io::Error| {
            assert_eq!(server.connection_state(fd), ConnectionState::Closed);
            error_kind.set(Some(error.kind()));
            server.close();
        });
    }
    {
        let disconnected = Rc::clone(&disconnected);
        server.on_disconnect(move |server, _fd| {
            disconnected.set(true);
            server.close();
        });
    }

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");

        let mut go = [0u8; 2];
        stream.read_exact(&mut go).expect("read");

        // Zero linger turns the close into a reset.
        let linger = libc::linger {
            l_onoff: 1,
            l_linger: 0,
        };
        let ret = unsafe {
            libc::setsockopt(
                stream.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_LINGER,
                &linger as *const libc::linger as *const libc::c_void,
                std::mem::size_of::<libc::linger>() as libc::socklen_t,
            )
        };
        assert_eq!(ret, 0);
    });

    server.run().expect("run");
    client.join().unwrap();

    assert_eq!(error_kind.get(), Some(io::ErrorKind::ConnectionReset));
    assert!(!disconnected.get());
}

#[test]
fn connect_to_closed_port_fails() {
    common::init_tracing();
    let listen_fd = tcp_listener::listen(Some("127.0.0.1"), 0, 1).expect("listen");
    let port = tcp_listener::local_port(listen_fd).expect("local port");
    common::close(listen_fd);

    let mut server = NetworkServer::new();
    let error = server.connect("127.0.0.1", port).expect_err("nobody listens");

    assert_eq!(error.kind(), io::ErrorKind::ConnectionRefused);
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn close_tears_down_connections_and_listeners() {
    common::init_tracing();
    let (mut server, listen_fd, port) = listening_server();
    let disconnected = Rc::new(Cell::new(false));

    server.on_connect(|server, _fd| server.close());
    {
        let disconnected = Rc::clone(&disconnected);
        server.on_disconnect(move |_, _| disconnected.set(true));
    }

    let outbound = server.connect("127.0.0.1", port).expect("connect");
    assert_eq!(server.connection_count(), 1);
    assert!(server.is_watched(listen_fd));

    server.run().expect("run");

    assert_eq!(server.connection_count(), 0);
    assert_eq!(server.connection_state(outbound), ConnectionState::Closed);
    assert!(!server.is_watched(listen_fd));
    assert_eq!(server.fd_count(), 0);
    assert!(!disconnected.get());
}

#[test]
fn unknown_connection_is_a_violation() {
    common::init_tracing();
    let (mut server, listen_fd, _port) = listening_server();
    let missing: RawFd = 100_000;

    let violation = common::violation(|| {
        server.incoming(missing);
    });
    assert_eq!(violation, ContractViolation::UnknownConnection(missing));

    let violation = common::violation(|| server.discard(missing, 1));
    assert_eq!(violation, ContractViolation::UnknownConnection(missing));

    let violation = common::violation(|| server.disconnect(missing));
    assert_eq!(violation, ContractViolation::UnknownConnection(missing));

    // Listening sockets are watched but are not connections.
    let violation = common::violation(|| server.write(listen_fd, b"x"));
    assert_eq!(violation, ContractViolation::UnknownConnection(listen_fd));

    assert_eq!(server.connection_state(missing), ConnectionState::Closed);
}
