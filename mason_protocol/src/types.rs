// Core wire types for the Mason session protocol.
//
// These are lightweight value types used by both `message.rs` (the protocol
// vocabulary) and the session core (`mason_net`). Player ids are
// session-scoped integers handed out by the host, not stable identities —
// a reconnecting player gets a fresh id.

use std::fmt;

/// Session-scoped player id. Client ids are assigned by the host,
/// monotonically from 1, and never reused within a session. The host itself
/// uses the sentinel value `-1` on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub i32);

impl PlayerId {
    /// The host's own id on the wire.
    pub const HOST: PlayerId = PlayerId(-1);

    /// Derived display name, e.g. `Player3` (the host shows as `Player-1`).
    pub fn display_name(self) -> String {
        format!("Player{}", self.0)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host-side index of one connection among many. Distinct from the player
/// id assigned to whoever sits behind that connection: slots identify the
/// transport link, player ids identify the replicated entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(pub usize);

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Positional identity tolerance: two blocks whose coordinates differ by
/// less than this on every axis are the same block. Substitutes for an
/// explicit block id.
pub const BLOCK_EPSILON: f32 = 0.1;

/// Position in world space. Block positions are snapped to an integer-ish
/// grid by the placement code; the wire carries them as plain floats.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ORIGIN: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Epsilon-positional identity (see [`BLOCK_EPSILON`]).
    pub fn near(self, other: Vec3) -> bool {
        (self.x - other.x).abs() < BLOCK_EPSILON
            && (self.y - other.y).abs() < BLOCK_EPSILON
            && (self.z - other.z).abs() < BLOCK_EPSILON
    }
}

/// The fixed set of placeable block types. The wire carries the lowercase
/// name; anything else fails decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Grass,
    Stone,
    Wood,
    Metal,
    Brick,
    Dirt,
    Water,
    Lava,
    Cube,
}

impl BlockKind {
    pub const ALL: [BlockKind; 9] = [
        BlockKind::Grass,
        BlockKind::Stone,
        BlockKind::Wood,
        BlockKind::Metal,
        BlockKind::Brick,
        BlockKind::Dirt,
        BlockKind::Water,
        BlockKind::Lava,
        BlockKind::Cube,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Grass => "grass",
            BlockKind::Stone => "stone",
            BlockKind::Wood => "wood",
            BlockKind::Metal => "metal",
            BlockKind::Brick => "brick",
            BlockKind::Dirt => "dirt",
            BlockKind::Water => "water",
            BlockKind::Lava => "lava",
            BlockKind::Cube => "cube",
        }
    }

    pub fn from_name(name: &str) -> Option<BlockKind> {
        BlockKind::ALL.iter().copied().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
