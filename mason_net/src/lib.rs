// mason_net — peer synchronization for the Mason voxel sandbox.
//
// Star topology: one peer hosts, everyone else connects to it. The host is
// authoritative over player ids and the block list; clients apply what the
// host relays. Transport is plain blocking TCP from `std::net` with one
// receive thread per connection — no async runtime.
//
// Module overview:
// - `connection.rs`:  One socket plus its receive thread; delivers payloads
//                     and exactly one close notification per link.
// - `session.rs`:     Role state machine (None/Host/Client), accept loop,
//                     send/broadcast, handler dispatch.
// - `replication.rs`: The session handler — join handshake, id assignment,
//                     world relay. What makes peers converge.
// - `world.rs`:       Shared player roster and block list.
// - `driver.rs`:      Per-tick glue — throttled POS publication, keepalive.
// - `commands.rs`:    Console command registry (`host`, `connect`, ...).
// - `console.rs`:     Bounded in-game console history buffer.
// - `discovery.rs`:   Shareable LAN/VPN address enumeration.
// - `settings.rs`:    Obfuscated on-disk settings blob.
//
// Message encoding lives in `mason_protocol`; this crate only moves bytes
// and applies their meaning.

pub mod commands;
mod connection;
pub mod console;
pub mod discovery;
pub mod driver;
pub mod replication;
pub mod session;
pub mod settings;
pub mod world;

pub use commands::{CommandContext, CommandRegistry};
pub use console::Console;
pub use driver::{POSITION_INTERVAL, SessionDriver};
pub use replication::Replicator;
pub use session::{DEFAULT_PORT, Handler, PING_INTERVAL, Role, Session, SessionEvent};
pub use settings::Settings;
pub use world::{Block, Player, World};
