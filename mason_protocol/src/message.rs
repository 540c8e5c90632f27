// Protocol vocabulary for host/client session traffic.
//
// One enum covers both directions: the star topology means every message
// either flows client→host or host→client(s), and several kinds (`POS`,
// `BLOCK:*`) travel both ways with identical meaning. The doc comment on
// each variant gives its exact wire form; `codec.rs` owns the text grammar.

use crate::types::{BlockKind, PlayerId, Vec3};

/// A single logical protocol message.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Join handshake request: `JOIN`. On the host this is also synthesized
    /// by the accept loop for every new connection, so the handshake runs
    /// whether or not the client sends one explicitly.
    Join,
    /// Graceful leave notice: `LEAVE`.
    Leave,
    /// Host→client id assignment: `ASSIGN_ID:<int>`. Arrival is the client's
    /// synchronization barrier — no block edit may be sent before it.
    AssignId(PlayerId),
    /// Host broadcast announcing a new member: `NEW_PLAYER:<int>`.
    NewPlayer(PlayerId),
    /// Host broadcast announcing a departure: `PLAYER_LEFT:<int>`.
    PlayerLeft(PlayerId),
    /// Position update: `POS:<id>:<x>,<y>,<z>`. The host sends its own
    /// position with id `-1`; clients use their assigned id.
    Pos { id: PlayerId, position: Vec3 },
    /// Block placement: `BLOCK:ADD|<x>,<y>,<z>|<type>`.
    BlockAdd { position: Vec3, kind: BlockKind },
    /// Block removal: `BLOCK:REMOVE|<x>,<y>,<z>`.
    BlockRemove { position: Vec3 },
    /// Host→client order to drop all local blocks: `MAP:CLEAR`. Sent at the
    /// start of the join handshake before the full block list.
    MapClear,
    /// Client→host keepalive: `PING`. Informational only; the host ignores it.
    Ping,
}
