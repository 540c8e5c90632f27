// One live peer link: a TCP stream plus its dedicated blocking receive loop.
//
// Connections are owned exclusively by the `Session` that created them and
// never outlive it. The receive loop runs on its own thread and reports
// upward through a callback: raw payloads while the link is healthy, and a
// single `Closed` notice when it dies. All blocking I/O stays on that
// thread — the game loop only ever touches the synchronous `send` path.
//
// Liveness is an atomic flag with swap semantics: whichever side observes
// the link's end first (the receive loop on EOF/error, or `close()` during
// teardown) takes the flag, so the synthetic disconnect notice fires
// exactly once and never for a deliberate close.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use mason_protocol::Slot;

/// Receive buffer size. The protocol assumes one send arrives as one
/// receive; every message fits in a fraction of this.
const RECV_BUFFER: usize = 1024;

/// What a receive loop reports upward.
pub(crate) enum Incoming {
    /// One received payload, assumed to hold exactly one wire message.
    Payload(Vec<u8>),
    /// The link ended (EOF or I/O error). Emitted at most once, and never
    /// after a deliberate `close()`.
    Closed,
}

pub(crate) struct Connection {
    stream: TcpStream,
    /// Serializes writers so concurrent sends cannot interleave partial
    /// payloads on the stream.
    send_lock: Mutex<()>,
    alive: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
    pub(crate) slot: Slot,
}

impl Connection {
    /// Wrap an established stream. The receive loop is started separately
    /// (see `start_receive`) so the host can run the synthetic join
    /// handshake before any real traffic from this peer is read.
    pub(crate) fn new(stream: TcpStream, slot: Slot) -> Self {
        Self {
            stream,
            send_lock: Mutex::new(()),
            alive: Arc::new(AtomicBool::new(true)),
            thread: Mutex::new(None),
            slot,
        }
    }

    /// Spawn the blocking receive loop. `tolerate_timeouts` is set on the
    /// client side, where a read timeout is armed on the stream and a
    /// timeout means "keep waiting", not "peer gone"; host-side reads have
    /// no timeout and only end on EOF or error.
    pub(crate) fn start_receive(
        &self,
        tolerate_timeouts: bool,
        on_event: impl Fn(Slot, Incoming) + Send + 'static,
    ) -> io::Result<()> {
        let reader = self.stream.try_clone()?;
        let alive = Arc::clone(&self.alive);
        let slot = self.slot;
        let handle = thread::Builder::new()
            .name(format!("mason-recv-{}", slot.0))
            .spawn(move || receive_loop(reader, slot, tolerate_timeouts, &alive, on_event))?;
        *self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Synchronous send, safe against the receive loop and other senders.
    /// A failed send is reported, not retried; the receive loop notices a
    /// broken stream on its own.
    pub(crate) fn send(&self, payload: &[u8]) -> bool {
        if !self.is_alive() {
            return false;
        }
        let _guard = self
            .send_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match (&self.stream).write_all(payload) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(slot = self.slot.0, %err, "send failed");
                false
            }
        }
    }

    /// Idempotent; safe from any thread. Shutting the socket down unblocks
    /// the receive loop. Taking the liveness flag first marks this as a
    /// deliberate close, which suppresses the loop's `Closed` notice.
    pub(crate) fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    /// Wait for the receive loop to exit. Call after `close`; never call
    /// from the receive loop itself.
    pub(crate) fn join(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

fn receive_loop(
    stream: TcpStream,
    slot: Slot,
    tolerate_timeouts: bool,
    alive: &AtomicBool,
    on_event: impl Fn(Slot, Incoming),
) {
    let mut buf = [0u8; RECV_BUFFER];
    while alive.load(Ordering::SeqCst) {
        match (&stream).read(&mut buf) {
            Ok(0) => break,
            Ok(n) => on_event(slot, Incoming::Payload(buf[..n].to_vec())),
            Err(err)
                if tolerate_timeouts
                    && matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
            {
                // Client reads are armed with a timeout; a quiet host is
                // not a dead host.
            }
            Err(err) => {
                tracing::debug!(slot = slot.0, %err, "receive failed");
                break;
            }
        }
    }
    // Report the end of the link exactly once, and only if this loop still
    // owned the liveness flag (a deliberate close already took it).
    if alive.swap(false, Ordering::SeqCst) {
        on_event(slot, Incoming::Closed);
    }
}
