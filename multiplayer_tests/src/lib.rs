// Test-only peers for multiplayer integration tests.
//
// Two fixtures, both synchronous and deliberately dumb:
// - `TestPeer`: a raw TCP client speaking wire text at a real hosted
//   `Session`, with `read_exact`-based expectations. Expecting the exact
//   concatenated byte stream sidesteps TCP coalescing: the protocol has no
//   framing, so back-to-back host sends may arrive in one read.
// - `FakeHost`: a raw TCP listener a real client `Session` connects to,
//   with paced sends so each message lands as its own read on the client.
//
// All real logic under test lives in `mason_net`; nothing here decodes or
// interprets messages.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

/// Timeout for blocking reads and poll loops.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Gap between paced `FakeHost` sends, long enough for the client's
/// receive loop to drain each message before the next arrives.
pub const PACING: Duration = Duration::from_millis(30);

/// Spin until `done` holds or the timeout trips.
pub fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + TEST_TIMEOUT;
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Raw TCP client against a hosted `Session`.
pub struct TestPeer {
    stream: TcpStream,
}

impl TestPeer {
    /// Connect to a host on localhost. Panics on failure, as fixtures do.
    pub fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port)).expect("TestPeer::connect failed");
        stream
            .set_read_timeout(Some(TEST_TIMEOUT))
            .expect("set_read_timeout failed");
        Self { stream }
    }

    pub fn send(&mut self, wire: &str) {
        self.stream
            .write_all(wire.as_bytes())
            .expect("TestPeer::send failed");
    }

    /// Read exactly `wire.len()` bytes and assert they match. Call with the
    /// full expected stream when several host sends may coalesce.
    pub fn expect(&mut self, wire: &str) {
        let mut buf = vec![0u8; wire.len()];
        self.stream
            .read_exact(&mut buf)
            .unwrap_or_else(|err| panic!("expected {wire:?}, read failed: {err}"));
        let got = std::str::from_utf8(&buf).expect("non-UTF-8 from host");
        assert_eq!(got, wire);
    }

    /// Assert nothing arrives within a short window.
    pub fn expect_silence(&mut self) {
        self.stream
            .set_read_timeout(Some(Duration::from_millis(200)))
            .expect("set_read_timeout failed");
        let mut buf = [0u8; 256];
        match self.stream.read(&mut buf) {
            Ok(0) => panic!("expected silence, got EOF"),
            Ok(n) => panic!(
                "expected silence, got {:?}",
                String::from_utf8_lossy(&buf[..n])
            ),
            Err(err) => assert!(
                matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ),
                "expected timeout, got {err}"
            ),
        }
        self.stream
            .set_read_timeout(Some(TEST_TIMEOUT))
            .expect("set_read_timeout failed");
    }

    /// Assert the host has closed this connection.
    pub fn expect_eof(&mut self) {
        let mut buf = [0u8; 64];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return,
                Ok(_) => continue, // drain whatever was in flight
                Err(err) => panic!("expected EOF, got {err}"),
            }
        }
    }
}

/// Raw TCP host a real client `Session` connects to.
pub struct FakeHost {
    listener: TcpListener,
    accepted: Option<TcpStream>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::start()
    }
}

impl FakeHost {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("FakeHost bind failed");
        Self {
            listener,
            accepted: None,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.listener.local_addr().expect("local_addr failed")
    }

    /// Block until the client under test connects.
    pub fn accept(&mut self) {
        let (stream, _) = self.listener.accept().expect("FakeHost accept failed");
        stream
            .set_read_timeout(Some(TEST_TIMEOUT))
            .expect("set_read_timeout failed");
        self.accepted = Some(stream);
    }

    fn stream(&mut self) -> &mut TcpStream {
        self.accepted.as_mut().expect("FakeHost: accept() first")
    }

    /// Send one message, then pause so it lands as its own read.
    pub fn send(&mut self, wire: &str) {
        self.stream()
            .write_all(wire.as_bytes())
            .expect("FakeHost::send failed");
        std::thread::sleep(PACING);
    }

    /// Read exactly the expected bytes from the client.
    pub fn expect(&mut self, wire: &str) {
        let mut buf = vec![0u8; wire.len()];
        self.stream()
            .read_exact(&mut buf)
            .unwrap_or_else(|err| panic!("expected {wire:?}, read failed: {err}"));
        let got = std::str::from_utf8(&buf).expect("non-UTF-8 from client");
        assert_eq!(got, wire);
    }

    /// Read one chunk of whatever the client sent.
    pub fn read_some(&mut self) -> String {
        let mut buf = [0u8; 512];
        let n = self.stream().read(&mut buf).expect("FakeHost read failed");
        assert!(n > 0, "client closed unexpectedly");
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    /// Drop the accepted connection, simulating a host crash.
    pub fn kill_connection(&mut self) {
        self.accepted = None;
    }
}
