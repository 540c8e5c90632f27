// Session core: role state machine, connection set, and message dispatch.
//
// Architecture: thread-per-receiver. Every connection runs a blocking
// receive loop on its own thread (`connection.rs`); the host additionally
// runs an accept loop that polls a non-blocking listener on a short cadence
// under a running flag. Decoded messages are dispatched straight from the
// receive threads to the registered handler, so the handler must be safe to
// call concurrently from multiple threads at once. The game loop only ever
// calls the synchronous entry points (`send`, `broadcast`, `update`).
//
// Lock discipline, in order of acquisition hazards:
// - `broadcast`/`send_to` clone connection handles under the set lock and
//   drop it before touching any socket, so a handler-initiated broadcast
//   can never deadlock against `disconnect`.
// - `disconnect` takes the whole connection set out under the lock, then
//   closes and joins the threads with no lock held; a racing handler sees
//   an empty set and its sends become no-ops.
// - The handler slot is cloned out of its mutex before invocation, so a
//   handler may call back into the session freely.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mason_protocol::{Message, Slot, codec, encode};

use crate::connection::{Connection, Incoming};

/// Default listen/connect port.
pub const DEFAULT_PORT: u16 = 27015;

/// Connect, read, and write timeout on the client side. Host-side reads
/// have no timeout; a silent peer is only detected by EOF or an I/O error.
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Seconds of client idle time between keepalive pings.
pub const PING_INTERVAL: f32 = 5.0;

/// Accept-loop poll cadence while waiting for connections.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// The session's place in the star topology. Set once per session lifetime
/// by `start_host`/`connect`; reset to `None` by `disconnect`. There is no
/// direct Host↔Client transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    None,
    Host,
    Client,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::None => "None",
            Role::Host => "Host",
            Role::Client => "Client",
        })
    }
}

/// What the session hands to the registered handler.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// One decoded message. `raw` keeps the exact received bytes so the
    /// handler can re-broadcast verbatim instead of re-encoding.
    Message { message: Message, raw: Vec<u8> },
    /// The tagged connection dropped without a LEAVE. Emitted exactly once
    /// per connection, and not during deliberate teardown.
    Disconnected,
}

/// The registered message handler. Invoked from receive-loop threads, so it
/// must be callable concurrently from multiple threads simultaneously. The
/// session itself is passed in, so the handler can reply or re-broadcast
/// without holding its own reference.
pub type Handler = Arc<dyn Fn(&Session, SessionEvent, Slot) + Send + Sync>;

struct SessionInner {
    role: Mutex<Role>,
    /// Cleared first on disconnect; gates the accept loop and suppresses
    /// synthetic disconnect dispatches during teardown.
    running: AtomicBool,
    /// Client-side link liveness. The role stays `Client` after a link
    /// failure; only `send` starts refusing.
    connected: AtomicBool,
    /// Slot-indexed. Dead slots keep their index (`None`) so slot numbers
    /// stay stable and monotonic for the life of the session.
    connections: Mutex<Vec<Option<Arc<Connection>>>>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
    handler: Mutex<Option<Handler>>,
    ping_timer: Mutex<f32>,
}

/// One multiplayer session: either a host accepting many clients, a client
/// holding a single link to its host, or idle. Cheap to clone; clones share
/// the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                role: Mutex::new(Role::None),
                running: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                connections: Mutex::new(Vec::new()),
                accept_thread: Mutex::new(None),
                handler: Mutex::new(None),
                ping_timer: Mutex::new(0.0),
            }),
        }
    }

    pub fn role(&self) -> Role {
        *lock(&self.inner.role)
    }

    pub fn is_host(&self) -> bool {
        self.role() == Role::Host
    }

    pub fn is_client(&self) -> bool {
        self.role() == Role::Client
    }

    /// Client: whether the link to the host is still believed healthy.
    /// Host: whether the session is running at all.
    pub fn is_connected(&self) -> bool {
        match self.role() {
            Role::None => false,
            Role::Host => self.inner.running.load(Ordering::SeqCst),
            Role::Client => self.inner.connected.load(Ordering::SeqCst),
        }
    }

    /// Register the message handler. Must be reentrant-safe: it is invoked
    /// concurrently from every receive thread.
    pub fn set_handler(&self, handler: Handler) {
        *lock(&self.inner.handler) = Some(handler);
    }

    /// Bind and listen, then spawn the accept loop. Returns the bound
    /// address (so port 0 works in tests). On failure nothing changes and
    /// the caller may retry with another port.
    pub fn start_host(&self, port: u16) -> io::Result<SocketAddr> {
        if self.role() != Role::None {
            self.disconnect();
        }

        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))?;
        let addr = listener.local_addr()?;
        // Non-blocking so the accept loop can watch the running flag.
        listener.set_nonblocking(true)?;

        self.inner.running.store(true, Ordering::SeqCst);
        *lock(&self.inner.role) = Role::Host;

        let weak = Arc::downgrade(&self.inner);
        let accept_thread = thread::Builder::new()
            .name("mason-accept".into())
            .spawn(move || accept_loop(&listener, &weak))
            .inspect_err(|_| {
                self.inner.running.store(false, Ordering::SeqCst);
                *lock(&self.inner.role) = Role::None;
            })?;
        *lock(&self.inner.accept_thread) = Some(accept_thread);

        tracing::info!(%addr, "hosting session");
        Ok(addr)
    }

    /// Open the single link to a host, with a bounded connect timeout and
    /// matching read/write timeouts thereafter. On failure the session is
    /// left in `Role::None` with no side effects.
    pub fn connect(&self, ip: &str, port: u16) -> io::Result<()> {
        if self.role() != Role::None {
            self.disconnect();
        }

        let ip: Ipv4Addr = ip
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid ip {ip:?}")))?;
        let addr = SocketAddr::from((ip, port));
        let stream = TcpStream::connect_timeout(&addr, IO_TIMEOUT)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;

        let connection = Arc::new(Connection::new(stream, Slot(0)));
        let weak = Arc::downgrade(&self.inner);
        connection
            .start_receive(true, move |slot, incoming| {
                receive_event(&weak, slot, incoming);
            })
            .inspect_err(|_| connection.close())?;

        *lock(&self.inner.connections) = vec![Some(connection)];
        self.inner.running.store(true, Ordering::SeqCst);
        self.inner.connected.store(true, Ordering::SeqCst);
        *lock(&self.inner.role) = Role::Client;

        tracing::info!(%addr, "connected to host");
        Ok(())
    }

    /// Client-only: write to the host link. Returns false (role unchanged)
    /// when idle, host, or the link has failed.
    pub fn send(&self, payload: &[u8]) -> bool {
        if self.role() != Role::Client || !self.inner.connected.load(Ordering::SeqCst) {
            return false;
        }
        let connection = lock(&self.inner.connections)
            .first()
            .and_then(Clone::clone);
        let ok = connection.is_some_and(|c| c.send(payload));
        if !ok {
            self.inner.connected.store(false, Ordering::SeqCst);
        }
        ok
    }

    /// Host-only: best-effort write to every live connection. Individual
    /// failures are ignored; a broadcast is not all-or-nothing.
    pub fn broadcast(&self, payload: &[u8]) {
        if self.role() != Role::Host {
            return;
        }
        let targets: Vec<Arc<Connection>> = lock(&self.inner.connections)
            .iter()
            .flatten()
            .cloned()
            .collect();
        for connection in targets {
            connection.send(payload);
        }
    }

    /// Host-only: write to one connection by slot. False when the slot is
    /// unknown or dead.
    pub fn send_to(&self, slot: Slot, payload: &[u8]) -> bool {
        if self.role() != Role::Host {
            return false;
        }
        let connection = lock(&self.inner.connections)
            .get(slot.0)
            .and_then(Clone::clone);
        connection.is_some_and(|c| c.send(payload))
    }

    /// Number of live connections (0 or 1 for a client).
    pub fn connection_count(&self) -> usize {
        lock(&self.inner.connections)
            .iter()
            .flatten()
            .filter(|c| c.is_alive())
            .count()
    }

    /// Tear the session down: stop the accept loop, close every connection,
    /// join all spawned threads, clear the set, reset the role. Blocking by
    /// design — this belongs at session teardown, not on a hot path.
    /// Idempotent.
    pub fn disconnect(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.connected.store(false, Ordering::SeqCst);

        let accept_thread = lock(&self.inner.accept_thread).take();
        if let Some(handle) = accept_thread {
            let _ = handle.join();
        }

        // Take the set out first; no lock is held while joining, so receive
        // threads still finishing a dispatch can run to completion.
        let connections = std::mem::take(&mut *lock(&self.inner.connections));
        for connection in connections.iter().flatten() {
            connection.close();
        }
        for connection in connections.iter().flatten() {
            connection.join();
        }

        *lock(&self.inner.ping_timer) = 0.0;
        let mut role = lock(&self.inner.role);
        if *role != Role::None {
            tracing::info!(role = %*role, "session closed");
        }
        *role = Role::None;
    }

    /// Per-tick housekeeping. Client-only keepalive: a `PING` every
    /// `PING_INTERVAL` seconds of accumulated time. No-op otherwise.
    pub fn update(&self, dt: f32) {
        if self.role() != Role::Client || !self.inner.connected.load(Ordering::SeqCst) {
            return;
        }
        let due = {
            let mut timer = lock(&self.inner.ping_timer);
            *timer += dt;
            if *timer > PING_INTERVAL {
                *timer = 0.0;
                true
            } else {
                false
            }
        };
        if due {
            self.send(encode(&Message::Ping).as_bytes());
        }
    }

    /// Run the registered handler for one event. The handler is cloned out
    /// of its slot first so it may call back into the session.
    pub(crate) fn dispatch(&self, event: SessionEvent, slot: Slot) {
        let handler = lock(&self.inner.handler).clone();
        if let Some(handler) = handler {
            handler(self, event, slot);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Host accept loop. Polls the non-blocking listener until the session
/// stops or is dropped.
fn accept_loop(listener: &TcpListener, weak: &Weak<SessionInner>) {
    loop {
        let Some(inner) = weak.upgrade() else { return };
        if !inner.running.load(Ordering::SeqCst) {
            return;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                register_client(&Session { inner }, stream, peer, weak);
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                drop(inner);
                thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                tracing::warn!(%err, "accept loop stopping");
                return;
            }
        }
    }
}

/// Host side of a new connection: assign the next slot, synthesize the
/// `JOIN` dispatch so the application-level handshake runs for every
/// accepted peer, then start the receive loop. The synthetic dispatch runs
/// before any real traffic from this peer is read, so the handshake cannot
/// race the client's first message.
fn register_client(session: &Session, stream: TcpStream, peer: SocketAddr, weak: &Weak<SessionInner>) {
    let connection = {
        let mut connections = lock(&session.inner.connections);
        let slot = Slot(connections.len());
        let connection = Arc::new(Connection::new(stream, slot));
        connections.push(Some(Arc::clone(&connection)));
        connection
    };
    let slot = connection.slot;
    tracing::debug!(%peer, slot = slot.0, "client connected");

    session.dispatch(
        SessionEvent::Message {
            message: Message::Join,
            raw: b"JOIN".to_vec(),
        },
        slot,
    );

    let weak = weak.clone();
    let started = connection.start_receive(false, move |slot, incoming| {
        receive_event(&weak, slot, incoming);
    });
    if started.is_err() {
        connection.close();
        if let Some(entry) = lock(&session.inner.connections).get_mut(slot.0) {
            *entry = None;
        }
    }
}

/// Receive-thread entry: decode and dispatch one payload, or convert the
/// end of a link into a single synthetic `Disconnected` dispatch.
fn receive_event(weak: &Weak<SessionInner>, slot: Slot, incoming: Incoming) {
    let Some(inner) = weak.upgrade() else { return };
    let session = Session { inner };
    match incoming {
        Incoming::Payload(bytes) => match codec::decode(&bytes) {
            Ok(message) => session.dispatch(SessionEvent::Message { message, raw: bytes }, slot),
            Err(err) => {
                // Malformed traffic is dropped whole; the link stays up.
                tracing::warn!(slot = slot.0, %err, "dropping malformed message");
            }
        },
        Incoming::Closed => {
            if !session.inner.running.load(Ordering::SeqCst) {
                return; // Deliberate teardown, not a peer failure.
            }
            match session.role() {
                Role::None => return,
                Role::Client => session.inner.connected.store(false, Ordering::SeqCst),
                Role::Host => {
                    if let Some(entry) = lock(&session.inner.connections).get_mut(slot.0) {
                        *entry = None;
                    }
                }
            }
            tracing::debug!(slot = slot.0, "connection lost");
            session.dispatch(SessionEvent::Disconnected, slot);
        }
    }
}
