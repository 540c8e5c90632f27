// World state replication: the session handler that keeps every peer's
// world converging on the host's.
//
// The host is authoritative. It assigns player ids, replays the current
// world to each joiner, and relays every accepted mutation to all clients
// verbatim (the received bytes, not a re-encoding). Clients apply whatever
// the host sends and never relay.
//
// Runs on receive-loop threads, so every entry point takes `&self` and all
// mutable state sits behind its own lock or atomic.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use mason_protocol::{BlockKind, Message, PlayerId, Slot, Vec3, encode};

use crate::console::Console;
use crate::session::{Session, SessionEvent};
use crate::world::World;

/// Session handler plus the local-peer bookkeeping around it: id
/// assignment on the host, the assigned id and sync barrier on a client.
pub struct Replicator {
    world: World,
    console: Console,
    /// Host: next id to hand out. Ids start at 1 and are never reused, so
    /// a stale `PLAYER_LEFT` can never name a current player.
    next_player_id: AtomicI32,
    /// Host: which player each live slot maps to. Entries persist for the
    /// life of the connection; a re-sent `JOIN` replays the same id.
    slot_players: Mutex<BTreeMap<Slot, PlayerId>>,
    /// Client: the id the host assigned, `None` until `ASSIGN_ID` lands.
    local_id: Mutex<Option<PlayerId>>,
}

impl Replicator {
    pub fn new(world: World, console: Console) -> Arc<Self> {
        Arc::new(Self {
            world,
            console,
            next_player_id: AtomicI32::new(1),
            slot_players: Mutex::new(BTreeMap::new()),
            local_id: Mutex::new(None),
        })
    }

    /// Wire this replicator in as the session's handler.
    pub fn install(self: &Arc<Self>, session: &Session) {
        let replicator = Arc::clone(self);
        session.set_handler(Arc::new(move |session, event, slot| {
            replicator.handle(session, event, slot);
        }));
    }

    /// Client: the id the host assigned, once the handshake has run.
    pub fn local_id(&self) -> Option<PlayerId> {
        *lock(&self.local_id)
    }

    /// Client: true once `ASSIGN_ID` has landed. That arrival is the
    /// synchronization barrier: no block placement may be sent before it.
    pub fn is_synchronized(&self) -> bool {
        self.local_id().is_some()
    }

    /// Forget all per-session state. Call when leaving a session; the next
    /// hosting or join starts from a clean slate.
    pub fn reset(&self) {
        self.next_player_id.store(1, Ordering::SeqCst);
        lock(&self.slot_players).clear();
        *lock(&self.local_id) = None;
    }

    /// The session handler. Invoked concurrently from receive threads.
    pub fn handle(&self, session: &Session, event: SessionEvent, slot: Slot) {
        match event {
            SessionEvent::Message { message, raw } => {
                if session.is_host() {
                    self.handle_as_host(session, message, &raw, slot);
                } else {
                    self.handle_as_client(message);
                }
            }
            SessionEvent::Disconnected => {
                if session.is_host() {
                    self.host_remove_slot(session, slot);
                } else {
                    self.console.push("Lost connection to host");
                }
            }
        }
    }

    fn handle_as_host(&self, session: &Session, message: Message, raw: &[u8], slot: Slot) {
        match message {
            Message::Join => self.host_join(session, slot),
            Message::Leave => self.host_remove_slot(session, slot),
            Message::Pos { id, position } => {
                self.world.upsert_player(id, position);
                // Relayed verbatim, including to the sender; the original
                // bytes already passed decode so they are well-formed.
                session.broadcast(raw);
            }
            Message::BlockAdd { position, kind } => {
                self.world.add_block(position, kind);
                // Broadcast even when deduplicated, so every client that
                // speculatively placed the block converges on one copy.
                session.broadcast(raw);
            }
            Message::BlockRemove { position } => {
                if self.world.remove_block(position) {
                    session.broadcast(raw);
                }
            }
            Message::Ping => {}
            // Host-to-client control traffic; a client must not send these.
            Message::AssignId(_)
            | Message::NewPlayer(_)
            | Message::PlayerLeft(_)
            | Message::MapClear => {
                tracing::warn!(slot = slot.0, ?message, "ignoring host-only message from client");
            }
        }
    }

    /// The join handshake, per slot. Idempotent: an explicit `JOIN` from a
    /// slot that already has an id replays the same handshake with the same
    /// id, so a client may re-request the world snapshot.
    fn host_join(&self, session: &Session, slot: Slot) {
        let (id, first_join) = {
            let mut slots = lock(&self.slot_players);
            match slots.get(&slot) {
                Some(id) => (*id, false),
                None => {
                    let id = PlayerId(self.next_player_id.fetch_add(1, Ordering::SeqCst));
                    slots.insert(slot, id);
                    (id, true)
                }
            }
        };

        // Snapshot reply, in order: identity, clean slate, blocks, players.
        session.send_to(slot, encode(&Message::AssignId(id)).as_bytes());
        session.send_to(slot, encode(&Message::MapClear).as_bytes());
        for block in self.world.blocks() {
            session.send_to(
                slot,
                encode(&Message::BlockAdd {
                    position: block.position,
                    kind: block.kind,
                })
                .as_bytes(),
            );
        }
        for player in self.world.players() {
            if player.id != id {
                session.send_to(
                    slot,
                    encode(&Message::Pos {
                        id: player.id,
                        position: player.position,
                    })
                    .as_bytes(),
                );
            }
        }

        if first_join {
            self.world.insert_player_stub(id);
            session.broadcast(encode(&Message::NewPlayer(id)).as_bytes());
            self.console.push(format!("{} joined", id.display_name()));
        }
    }

    /// Shared exit path for `LEAVE` and connection loss.
    fn host_remove_slot(&self, session: &Session, slot: Slot) {
        let Some(id) = lock(&self.slot_players).remove(&slot) else {
            return; // Never finished joining, or already removed.
        };
        self.world.remove_player(id);
        session.broadcast(encode(&Message::PlayerLeft(id)).as_bytes());
        self.console.push(format!("{} left", id.display_name()));
    }

    fn handle_as_client(&self, message: Message) {
        match message {
            Message::AssignId(id) => {
                *lock(&self.local_id) = Some(id);
                self.world.insert_player_stub(id);
                self.console.push(format!("You are {}", id.display_name()));
            }
            Message::NewPlayer(id) => {
                if self.world.insert_player_stub(id) {
                    self.console.push(format!("{} joined", id.display_name()));
                }
            }
            Message::PlayerLeft(id) => {
                if self.world.remove_player(id) {
                    self.console.push(format!("{} left", id.display_name()));
                }
            }
            Message::Pos { id, position } => {
                // Includes our own relayed positions; harmless to reapply.
                self.world.upsert_player(id, position);
            }
            Message::BlockAdd { position, kind } => {
                self.world.add_block(position, kind);
            }
            Message::BlockRemove { position } => {
                self.world.remove_block(position);
            }
            Message::MapClear => {
                self.world.clear_blocks();
            }
            // A client never receives peer-to-host traffic.
            Message::Join | Message::Leave | Message::Ping => {
                tracing::warn!(?message, "ignoring client-only message from host");
            }
        }
    }

    /// Local block placement: mutate the local world first, then publish.
    /// The host broadcasts; a client sends to the host fire-and-forget and
    /// treats the host's own re-broadcast as a duplicate (the positional
    /// dedupe absorbs it). Refused on a client until the initial sync has
    /// landed. Returns whether anything was applied or sent.
    pub fn place_block(&self, session: &Session, position: Vec3, kind: BlockKind) -> bool {
        let message = encode(&Message::BlockAdd { position, kind });
        if session.is_host() {
            self.world.add_block(position, kind);
            session.broadcast(message.as_bytes());
            true
        } else if session.is_client() && self.is_synchronized() {
            self.world.add_block(position, kind);
            session.send(message.as_bytes())
        } else {
            false
        }
    }

    /// Local block removal, same local-first flow. Unlike placement, not
    /// gated on sync: removing what is visibly there is safe to request at
    /// any time.
    pub fn break_block(&self, session: &Session, position: Vec3) -> bool {
        let message = encode(&Message::BlockRemove { position });
        if session.is_host() {
            if self.world.remove_block(position) {
                session.broadcast(message.as_bytes());
                true
            } else {
                false
            }
        } else if session.is_client() {
            self.world.remove_block(position);
            session.send(message.as_bytes())
        } else {
            false
        }
    }

    /// Host: push the full block set to every client, prefixed by a
    /// `MAP:CLEAR` so stale blocks do not survive the resync.
    pub fn resync_clients(&self, session: &Session) {
        if !session.is_host() {
            return;
        }
        session.broadcast(encode(&Message::MapClear).as_bytes());
        for block in self.world.blocks() {
            session.broadcast(
                encode(&Message::BlockAdd {
                    position: block.position,
                    kind: block.kind,
                })
                .as_bytes(),
            );
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
