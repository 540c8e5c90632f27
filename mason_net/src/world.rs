// Replicated world state shared between the game thread and receive threads.
//
// The player roster and block list are mutated both by the local game loop
// (local edits) and by every connection's receive loop (remote edits applied
// through the replication handler), so both live behind a single mutex.
// Each method takes the lock once and performs its lookup+mutate as one
// atomic step — the dedupe scan for a block add and the following insert
// must not be separable, or two near-simultaneous adds for the same
// position race into duplicate blocks.
//
// Block identity is positional: there is no block id, only the epsilon
// match from the protocol crate. The existence check is a linear scan;
// session worlds are small enough that a spatial index would be overkill.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use mason_protocol::{BlockKind, PlayerId, Vec3};

/// A replicated player entry. Created by the join handshake or by the first
/// `POS` referencing an unknown id; removed on leave.
#[derive(Clone, Debug)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub position: Vec3,
    pub rotation: Option<Vec3>,
}

impl Player {
    fn new(id: PlayerId, position: Vec3) -> Self {
        Self {
            id,
            name: id.display_name(),
            position,
            rotation: None,
        }
    }
}

/// A placed block. At most one block occupies a given position.
#[derive(Clone, Copy, Debug)]
pub struct Block {
    pub position: Vec3,
    pub kind: BlockKind,
}

#[derive(Default)]
struct WorldState {
    players: BTreeMap<PlayerId, Player>,
    blocks: Vec<Block>,
}

/// Shared handle to the replicated world. Clones refer to the same state.
#[derive(Clone, Default)]
pub struct World {
    state: Arc<Mutex<WorldState>>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WorldState> {
        // A panicked receive thread must not wedge the whole session.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or update a player's position. Returns true when the player
    /// was previously unknown (an implicit join).
    pub fn upsert_player(&self, id: PlayerId, position: Vec3) -> bool {
        let mut state = self.lock();
        match state.players.get_mut(&id) {
            Some(player) => {
                player.position = position;
                false
            }
            None => {
                state.players.insert(id, Player::new(id, position));
                true
            }
        }
    }

    /// Insert a player stub at the origin if the id is unknown. Returns
    /// true on insert; a known player's position is left untouched.
    pub fn insert_player_stub(&self, id: PlayerId) -> bool {
        let mut state = self.lock();
        if state.players.contains_key(&id) {
            return false;
        }
        state.players.insert(id, Player::new(id, Vec3::ORIGIN));
        true
    }

    pub fn remove_player(&self, id: PlayerId) -> bool {
        self.lock().players.remove(&id).is_some()
    }

    pub fn clear_players(&self) {
        self.lock().players.clear();
    }

    /// Snapshot of the roster, ordered by id.
    pub fn players(&self) -> Vec<Player> {
        self.lock().players.values().cloned().collect()
    }

    pub fn player_count(&self) -> usize {
        self.lock().players.len()
    }

    /// Insert a block unless one already occupies the position (within the
    /// epsilon on every axis). Returns true when the block was inserted.
    pub fn add_block(&self, position: Vec3, kind: BlockKind) -> bool {
        let mut state = self.lock();
        if state.blocks.iter().any(|b| b.position.near(position)) {
            return false;
        }
        state.blocks.push(Block { position, kind });
        true
    }

    /// Remove the first block matching the position. Returns true when a
    /// removal actually occurred.
    pub fn remove_block(&self, position: Vec3) -> bool {
        let mut state = self.lock();
        match state.blocks.iter().position(|b| b.position.near(position)) {
            Some(index) => {
                state.blocks.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn has_block(&self, position: Vec3) -> bool {
        self.lock().blocks.iter().any(|b| b.position.near(position))
    }

    pub fn clear_blocks(&self) {
        self.lock().blocks.clear();
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.lock().blocks.clone()
    }

    pub fn block_count(&self) -> usize {
        self.lock().blocks.len()
    }
}
