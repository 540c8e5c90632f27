// Per-tick glue between the game loop and the session: throttled position
// publication plus session housekeeping.

use mason_protocol::{Message, PlayerId, Vec3, encode};
use std::sync::Arc;

use crate::replication::Replicator;
use crate::session::Session;

/// Seconds between outgoing position updates.
pub const POSITION_INTERVAL: f32 = 0.2;

/// Owned by the game loop thread; not shared. Everything it touches
/// through `session`/`replicator` is internally synchronized.
pub struct SessionDriver {
    session: Session,
    replicator: Arc<Replicator>,
    position_timer: f32,
}

impl SessionDriver {
    pub fn new(session: Session, replicator: Arc<Replicator>) -> Self {
        Self {
            session,
            replicator,
            position_timer: 0.0,
        }
    }

    /// Advance one frame. Publishes the local position at most once per
    /// `POSITION_INTERVAL`, then runs the session's own housekeeping. A
    /// host stamps positions with the sentinel id -1; a client uses its
    /// assigned id and stays silent until one arrives.
    pub fn tick(&mut self, dt: f32, local_position: Vec3) {
        self.position_timer += dt;
        if self.position_timer > POSITION_INTERVAL {
            self.position_timer = 0.0;
            self.publish_position(local_position);
        }
        self.session.update(dt);
    }

    fn publish_position(&self, position: Vec3) {
        if self.session.is_host() {
            let wire = encode(&Message::Pos {
                id: PlayerId::HOST,
                position,
            });
            self.session.broadcast(wire.as_bytes());
        } else if self.session.is_client() {
            let Some(id) = self.replicator.local_id() else {
                return; // Not assigned yet; nothing worth stamping.
            };
            let wire = encode(&Message::Pos { id, position });
            self.session.send(wire.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpStream;
    use std::time::Duration;

    use super::*;
    use crate::console::Console;
    use crate::world::World;

    #[test]
    fn host_position_is_throttled_and_stamped_minus_one() {
        let world = World::new();
        let console = Console::new();
        let replicator = Replicator::new(world, console);
        let session = Session::new();
        replicator.install(&session);
        let addr = session.start_host(0).unwrap();

        let mut peer = TcpStream::connect(("127.0.0.1", addr.port())).unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while session.connection_count() == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        // Drain the join handshake first.
        let handshake = "ASSIGN_ID:1MAP:CLEARNEW_PLAYER:1";
        let mut buf = vec![0u8; handshake.len()];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(std::str::from_utf8(&buf).unwrap(), handshake);

        let mut driver = SessionDriver::new(session.clone(), replicator);
        driver.tick(0.1, Vec3::new(1.0, 2.0, 3.0)); // below threshold
        driver.tick(0.15, Vec3::new(1.0, 2.0, 3.0)); // crosses it
        driver.tick(0.1, Vec3::new(4.0, 2.0, 3.0)); // below again
        driver.tick(0.15, Vec3::new(4.0, 2.0, 3.0)); // crosses again

        let wire = "POS:-1:1.0,2.0,3.0POS:-1:4.0,2.0,3.0";
        let mut buf = vec![0u8; wire.len()];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(std::str::from_utf8(&buf).unwrap(), wire);
        session.disconnect();
    }

    #[test]
    fn idle_driver_sends_nothing() {
        let world = World::new();
        let console = Console::new();
        let replicator = Replicator::new(world, console);
        let session = Session::new();
        let mut driver = SessionDriver::new(session, replicator);
        // Role::None: ticking must be a no-op, not a panic.
        driver.tick(1.0, Vec3::ORIGIN);
        driver.tick(1.0, Vec3::ORIGIN);
    }
}
