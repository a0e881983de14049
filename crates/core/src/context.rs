//! Bounded conversation history for a single session.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A completed exchange: what the participant said and what the agent answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub transcript: String,
    pub response: String,
}

/// FIFO of the most recent turns, never longer than `depth`.
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    depth: usize,
    turns: VecDeque<Turn>,
}

impl TurnContext {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            turns: VecDeque::with_capacity(depth),
        }
    }

    /// Appends a turn, evicting the oldest entries beyond the depth bound.
    pub fn push(&mut self, turn: Turn) {
        if self.depth == 0 {
            return;
        }
        self.turns.push_back(turn);
        self.evict();
    }

    /// Changes the bound, evicting immediately if the history is now too long.
    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
        self.evict();
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Oldest first.
    pub fn turns(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    fn evict(&mut self) {
        while self.turns.len() > self.depth {
            self.turns.pop_front();
        }
    }
}
