// Shared diagnostic history — the backing store for the in-game console.
//
// Receive threads, the accept loop, and the game thread all append lines,
// so the buffer sits behind a mutex of its own. A plain mutex suffices: no
// handler or command path re-enters the console while already holding it.
// The buffer is bounded; the oldest lines are evicted first.
//
// A monotonic sequence number lets a front end poll for lines it has not
// yet shown without holding any lock between polls.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Maximum retained lines before eviction.
pub const MAX_HISTORY: usize = 200;

struct ConsoleState {
    /// Sequence number of the oldest retained line.
    first_seq: u64,
    lines: VecDeque<String>,
}

/// Shared console handle. Clones refer to the same buffer.
#[derive(Clone)]
pub struct Console {
    state: Arc<Mutex<ConsoleState>>,
}

impl Default for Console {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(ConsoleState {
                first_seq: 0,
                lines: VecDeque::new(),
            })),
        }
    }
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one line, evicting the oldest when full.
    pub fn push(&self, line: impl Into<String>) {
        let mut state = self.lock();
        if state.lines.len() == MAX_HISTORY {
            state.lines.pop_front();
            state.first_seq += 1;
        }
        state.lines.push_back(line.into());
    }

    /// All retained lines, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().lines.iter().cloned().collect()
    }

    /// Lines pushed after cursor `seen`, plus the new cursor. Lines evicted
    /// before being seen are silently skipped.
    pub fn since(&self, seen: u64) -> (Vec<String>, u64) {
        let state = self.lock();
        let total = state.first_seq + state.lines.len() as u64;
        let start = seen.clamp(state.first_seq, total) - state.first_seq;
        let fresh = state
            .lines
            .iter()
            .skip(usize::try_from(start).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        (fresh, total)
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.first_seq += state.lines.len() as u64;
        state.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().lines.is_empty()
    }
}
