// End-to-end integration tests for the multiplayer pipeline.
//
// Host-side tests start a real `Session` + `Replicator` on a random port
// and attach raw `TestPeer` sockets speaking literal wire text. Client-side
// tests run a real client `Session` against a raw `FakeHost`. Both
// directions exercise the same code paths as the live game; the fixtures
// never interpret messages.

use std::sync::Arc;
use std::time::Duration;

use mason_net::{Console, Replicator, Session, SessionDriver, World};
use mason_protocol::{BlockKind, PlayerId, Vec3};
use multiplayer_tests::{FakeHost, TestPeer, wait_for};

struct Host {
    session: Session,
    world: World,
    console: Console,
    replicator: Arc<Replicator>,
    port: u16,
}

/// Start a full host stack on a random port.
fn start_host() -> Host {
    let world = World::new();
    let console = Console::new();
    let replicator = Replicator::new(world.clone(), console.clone());
    let session = Session::new();
    replicator.install(&session);
    let addr = session.start_host(0).expect("start_host failed");
    Host {
        session,
        world,
        console,
        replicator,
        port: addr.port(),
    }
}

impl Host {
    /// Attach a raw peer and wait until the accept loop has registered it.
    fn join_peer(&self) -> TestPeer {
        let before = self.session.connection_count();
        let peer = TestPeer::connect(self.port);
        wait_for("peer accepted", || {
            self.session.connection_count() > before
        });
        peer
    }
}

// ---------------------------------------------------------------------------
// Host-side scenarios
// ---------------------------------------------------------------------------

/// First joiner on an empty world: identity, empty snapshot, own join
/// broadcast, nothing else.
#[test]
fn first_join_handshake_is_minimal() {
    let host = start_host();
    let mut peer = host.join_peer();

    peer.expect("ASSIGN_ID:1MAP:CLEARNEW_PLAYER:1");
    peer.expect_silence();
    assert_eq!(host.world.player_count(), 1);
    host.session.disconnect();
}

/// An explicit wire JOIN after the accept-time handshake replays the whole
/// handshake with the same id.
#[test]
fn explicit_join_replays_with_same_id() {
    let host = start_host();
    let mut peer = host.join_peer();
    peer.expect("ASSIGN_ID:1MAP:CLEARNEW_PLAYER:1");

    peer.send("JOIN");
    // Same id, full snapshot again (the player's own entry is skipped),
    // and no NEW_PLAYER broadcast: the slot already joined.
    peer.expect("ASSIGN_ID:1MAP:CLEAR");
    peer.expect_silence();
    assert_eq!(host.world.player_count(), 1);
    host.session.disconnect();
}

/// Second joiner sees the seeded block before any roster lines, and gets a
/// fresh id.
#[test]
fn second_join_receives_block_snapshot() {
    let host = start_host();
    host.world
        .add_block(Vec3::new(1.0, 1.0, 1.0), BlockKind::Stone);

    let mut first = host.join_peer();
    first.expect("ASSIGN_ID:1MAP:CLEARBLOCK:ADD|1.0,1.0,1.0|stoneNEW_PLAYER:1");

    let mut second = host.join_peer();
    second.expect(
        "ASSIGN_ID:2MAP:CLEARBLOCK:ADD|1.0,1.0,1.0|stonePOS:1:0.0,0.0,0.0NEW_PLAYER:2",
    );
    first.expect("NEW_PLAYER:2");
    host.session.disconnect();
}

/// A block add from one client is relayed verbatim to everyone and applied
/// once, even with the short integer float spelling.
#[test]
fn block_add_relays_verbatim_and_dedupes() {
    let host = start_host();
    let mut alice = host.join_peer();
    alice.expect("ASSIGN_ID:1MAP:CLEARNEW_PLAYER:1");
    let mut bob = host.join_peer();
    bob.expect("ASSIGN_ID:2MAP:CLEARPOS:1:0.0,0.0,0.0NEW_PLAYER:2");
    alice.expect("NEW_PLAYER:2");

    alice.send("BLOCK:ADD|5,1,5|grass");
    alice.expect("BLOCK:ADD|5,1,5|grass");
    bob.expect("BLOCK:ADD|5,1,5|grass");
    wait_for("block applied", || host.world.block_count() == 1);

    // The same placement again: still relayed, still one block.
    bob.send("BLOCK:ADD|5.0,1.0,5.0|grass");
    alice.expect("BLOCK:ADD|5.0,1.0,5.0|grass");
    bob.expect("BLOCK:ADD|5.0,1.0,5.0|grass");
    assert_eq!(host.world.block_count(), 1);
    host.session.disconnect();
}

/// Remove is only relayed when it actually removed something.
#[test]
fn block_remove_relays_only_on_hit() {
    let host = start_host();
    host.world
        .add_block(Vec3::new(2.0, 1.0, 2.0), BlockKind::Wood);
    let mut peer = host.join_peer();
    peer.expect("ASSIGN_ID:1MAP:CLEARBLOCK:ADD|2.0,1.0,2.0|woodNEW_PLAYER:1");

    peer.send("BLOCK:REMOVE|2.0,1.0,2.0");
    peer.expect("BLOCK:REMOVE|2.0,1.0,2.0");
    wait_for("block gone", || host.world.block_count() == 0);

    peer.send("BLOCK:REMOVE|2.0,1.0,2.0");
    peer.expect_silence();
    host.session.disconnect();
}

/// LEAVE and a dropped socket both produce exactly one PLAYER_LEFT.
#[test]
fn leave_and_drop_both_broadcast_departure() {
    let host = start_host();
    let mut stayer = host.join_peer();
    stayer.expect("ASSIGN_ID:1MAP:CLEARNEW_PLAYER:1");

    let mut leaver = host.join_peer();
    leaver.expect("ASSIGN_ID:2MAP:CLEARPOS:1:0.0,0.0,0.0NEW_PLAYER:2");
    stayer.expect("NEW_PLAYER:2");
    leaver.send("LEAVE");
    stayer.expect("PLAYER_LEFT:2");
    wait_for("leaver removed", || host.world.player_count() == 1);

    let dropper = host.join_peer();
    stayer.expect("NEW_PLAYER:3");
    drop(dropper);
    stayer.expect("PLAYER_LEFT:3");
    wait_for("dropper removed", || host.world.player_count() == 1);
    host.session.disconnect();
}

/// Ids keep climbing across departures; departed ids never come back.
#[test]
fn ids_are_monotonic_and_never_reused() {
    let host = start_host();
    for round in 1..=3 {
        let mut peer = host.join_peer();
        peer.expect(&format!("ASSIGN_ID:{round}MAP:CLEAR"));
        peer.send("LEAVE");
        wait_for("roster empty", || host.world.player_count() == 0);
        // Let the dropped socket detach fully before the next join, so
        // the connection-count wait in join_peer cannot race the EOF.
        drop(peer);
        wait_for("peer detached", || host.session.connection_count() == 0);
    }
    let mut last = host.join_peer();
    last.expect("ASSIGN_ID:4MAP:CLEARNEW_PLAYER:4");
    host.session.disconnect();
}

/// Malformed lines are dropped without killing the link.
#[test]
fn malformed_messages_do_not_kill_the_connection() {
    let host = start_host();
    let mut peer = host.join_peer();
    peer.expect("ASSIGN_ID:1MAP:CLEARNEW_PLAYER:1");

    peer.send("BLOCK:ADD|not,numbers,here|stone");
    peer.send("GIBBERISH");
    peer.expect_silence();

    // Link still works.
    peer.send("POS:1:1.0,2.0,3.0");
    peer.expect("POS:1:1.0,2.0,3.0");
    host.session.disconnect();
}

/// POS relays verbatim and upserts, including for an id the host has never
/// seen a JOIN for.
#[test]
fn pos_upserts_unknown_ids() {
    let host = start_host();
    let mut peer = host.join_peer();
    peer.expect("ASSIGN_ID:1MAP:CLEARNEW_PLAYER:1");

    peer.send("POS:42:7.0,8.0,9.0");
    peer.expect("POS:42:7.0,8.0,9.0");
    wait_for("ghost player appears", || host.world.player_count() == 2);
    host.session.disconnect();
}

/// PING is consumed silently.
#[test]
fn ping_is_ignored() {
    let host = start_host();
    let mut peer = host.join_peer();
    peer.expect("ASSIGN_ID:1MAP:CLEARNEW_PLAYER:1");
    peer.send("PING");
    peer.expect_silence();
    host.session.disconnect();
}

/// Host console records arrivals and departures.
#[test]
fn console_records_roster_changes() {
    let host = start_host();
    let mut peer = host.join_peer();
    peer.expect("ASSIGN_ID:1MAP:CLEARNEW_PLAYER:1");
    peer.send("LEAVE");
    wait_for("departure logged", || {
        let lines = host.console.snapshot();
        lines.contains(&"Player1 joined".to_string())
            && lines.contains(&"Player1 left".to_string())
    });
    host.session.disconnect();
}

/// Host-side `sync` resend: MAP:CLEAR then the full block list.
#[test]
fn resync_pushes_clear_then_blocks() {
    let host = start_host();
    host.world
        .add_block(Vec3::new(1.0, 1.0, 1.0), BlockKind::Brick);
    let mut peer = host.join_peer();
    peer.expect("ASSIGN_ID:1MAP:CLEARBLOCK:ADD|1.0,1.0,1.0|brickNEW_PLAYER:1");

    host.replicator.resync_clients(&host.session);
    peer.expect("MAP:CLEARBLOCK:ADD|1.0,1.0,1.0|brick");
    host.session.disconnect();
}

// ---------------------------------------------------------------------------
// Client-side scenarios
// ---------------------------------------------------------------------------

struct Client {
    session: Session,
    world: World,
    replicator: Arc<Replicator>,
}

/// Start a full client stack connected to the fake host.
fn connect_client(fake: &mut FakeHost) -> Client {
    let world = World::new();
    let console = Console::new();
    let replicator = Replicator::new(world.clone(), console.clone());
    let session = Session::new();
    replicator.install(&session);

    let addr = fake.addr();
    session
        .connect(&addr.ip().to_string(), addr.port())
        .expect("client connect failed");
    fake.accept();
    Client {
        session,
        world,
        replicator,
    }
}

/// The client applies the handshake stream and only then reports itself
/// synchronized; before ASSIGN_ID, block placement is refused.
#[test]
fn client_sync_barrier_gates_placement() {
    let mut fake = FakeHost::start();
    let client = connect_client(&mut fake);

    assert!(!client.replicator.is_synchronized());
    assert!(!client
        .replicator
        .place_block(&client.session, Vec3::ORIGIN, BlockKind::Cube));

    fake.send("MAP:CLEAR");
    fake.send("BLOCK:ADD|1.0,1.0,1.0|stone");
    fake.send("ASSIGN_ID:5");
    wait_for("client synchronized", || client.replicator.is_synchronized());
    assert_eq!(client.replicator.local_id(), Some(PlayerId(5)));
    assert_eq!(client.world.block_count(), 1);

    assert!(client
        .replicator
        .place_block(&client.session, Vec3::new(2.0, 1.0, 2.0), BlockKind::Cube));
    fake.expect("BLOCK:ADD|2.0,1.0,2.0|cube");
    client.session.disconnect();
}

/// Roster messages maintain the client's player list, with the host's own
/// positions arriving as id -1.
#[test]
fn client_tracks_roster_and_host_position() {
    let mut fake = FakeHost::start();
    let client = connect_client(&mut fake);

    fake.send("ASSIGN_ID:2");
    fake.send("NEW_PLAYER:3");
    fake.send("POS:-1:1.0,2.0,3.0");
    wait_for("roster filled", || client.world.player_count() == 3);

    fake.send("PLAYER_LEFT:3");
    wait_for("departure applied", || client.world.player_count() == 2);
    client.session.disconnect();
}

/// The driver publishes no POS until an id is assigned, then stamps it.
#[test]
fn client_driver_waits_for_id_then_stamps_it() {
    let mut fake = FakeHost::start();
    let client = connect_client(&mut fake);
    let mut driver = SessionDriver::new(client.session.clone(), Arc::clone(&client.replicator));

    driver.tick(0.3, Vec3::new(1.0, 2.0, 3.0)); // no id yet, stays silent
    fake.send("ASSIGN_ID:7");
    wait_for("id assigned", || client.replicator.is_synchronized());

    driver.tick(0.3, Vec3::new(1.0, 2.0, 3.0));
    fake.expect("POS:7:1.0,2.0,3.0");
    client.session.disconnect();
}

/// Accumulated idle time produces a PING after the keepalive interval.
#[test]
fn client_keepalive_pings_the_host() {
    let mut fake = FakeHost::start();
    let client = connect_client(&mut fake);

    client.session.update(5.5);
    fake.expect("PING");
    client.session.disconnect();
}

/// Losing the host flips the client to disconnected without ending the
/// process; role survives until an explicit disconnect.
#[test]
fn client_detects_host_loss() {
    let mut fake = FakeHost::start();
    let client = connect_client(&mut fake);
    assert!(client.session.is_connected());

    fake.kill_connection();
    wait_for("loss detected", || !client.session.is_connected());
    assert!(client.session.is_client());
    assert!(!client.session.send(b"PING"));
    client.session.disconnect();
}

// ---------------------------------------------------------------------------
// Concurrency properties (real sockets, many writers)
// ---------------------------------------------------------------------------

/// N peers each streaming M position updates concurrently: the roster ends
/// with one entry per id and each final position is the last one sent.
#[test]
fn concurrent_position_streams_do_not_lose_updates() {
    let host = start_host();
    const PEERS: usize = 4;
    const UPDATES: usize = 25;

    let mut peers = Vec::new();
    for i in 0..PEERS {
        let mut peer = host.join_peer();
        // Drain the variable-length join stream before the flood begins.
        let mut handshake = format!("ASSIGN_ID:{}MAP:CLEAR", i + 1);
        for seen in 1..=i {
            handshake.push_str(&format!("POS:{seen}:0.0,0.0,0.0"));
        }
        handshake.push_str(&format!("NEW_PLAYER:{}", i + 1));
        peer.expect(&handshake);
        peers.push(peer);
    }

    let writers: Vec<_> = peers
        .into_iter()
        .enumerate()
        .map(|(i, mut peer)| {
            std::thread::spawn(move || {
                let id = i + 1;
                for step in 0..UPDATES {
                    peer.send(&format!("POS:{id}:{}.0,0.0,0.0", step));
                    // Pace writes so messages never coalesce in the host's
                    // receive buffer (the wire has no framing).
                    std::thread::sleep(Duration::from_millis(5));
                }
                peer
            })
        })
        .collect();
    let peers: Vec<TestPeer> = writers.into_iter().map(|w| w.join().unwrap()).collect();

    wait_for("final positions applied", || {
        let players = host.world.players();
        players.len() == PEERS
            && players
                .iter()
                .all(|p| (p.position.x - (UPDATES as f32 - 1.0)).abs() < f32::EPSILON)
    });
    drop(peers);
    host.session.disconnect();
}

/// Many peers racing to place the same block: exactly one lands.
#[test]
fn concurrent_same_block_placement_inserts_once() {
    let host = start_host();
    const PEERS: usize = 6;

    let mut peers = Vec::new();
    for _ in 0..PEERS {
        peers.push(host.join_peer());
    }
    let writers: Vec<_> = peers
        .into_iter()
        .map(|mut peer| {
            std::thread::spawn(move || {
                peer.send("BLOCK:ADD|3.0,1.0,3.0|stone");
                peer
            })
        })
        .collect();
    let peers: Vec<TestPeer> = writers.into_iter().map(|w| w.join().unwrap()).collect();

    wait_for("all placements processed", || host.world.block_count() >= 1);
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(host.world.block_count(), 1);
    drop(peers);
    host.session.disconnect();
}
