//! Episode lifecycle bookkeeping.
//!
//! An episode runs from an arena reset until the arena reports `done` or the
//! step cap truncates it. [`Episode`] tracks the state, the step count and
//! the reward accumulated so far; it never touches the arena itself.

use serde::Serialize;

// ---------------------------------------------------------------------------
// EpisodeState
// ---------------------------------------------------------------------------

/// Lifecycle state of an episode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum EpisodeState {
    /// Before the first reset.
    #[default]
    Idle,
    /// Actively stepping.
    Running,
    /// The arena reached a terminal state.
    Done,
    /// Ended by the per-episode step cap.
    Truncated,
}

impl EpisodeState {
    /// Returns `true` if the episode is finished (Done or Truncated).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Truncated)
    }

    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Done => "done",
            Self::Truncated => "truncated",
        }
    }
}

// ---------------------------------------------------------------------------
// Episode
// ---------------------------------------------------------------------------

/// Counters for the current episode.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Episode {
    pub state: EpisodeState,
    /// Ticks applied this episode.
    pub step_count: u32,
    pub total_reward: f64,
    /// 1-based index of the current episode; `0` before the first reset.
    pub episode_number: u32,
}

impl Episode {
    /// Start the next episode.
    pub const fn reset(&mut self) {
        self.state = EpisodeState::Running;
        self.step_count = 0;
        self.total_reward = 0.0;
        self.episode_number += 1;
    }

    /// Restart the current episode in place: counters are zeroed but the
    /// episode number is kept.
    pub const fn restart(&mut self) {
        self.state = EpisodeState::Running;
        self.step_count = 0;
        self.total_reward = 0.0;
    }

    /// Record one applied tick. Returns `false` if the episode is not running.
    pub fn advance(&mut self, reward: f64) -> bool {
        if self.state != EpisodeState::Running {
            return false;
        }
        self.step_count += 1;
        self.total_reward += reward;
        true
    }

    pub const fn terminate(&mut self) {
        self.state = EpisodeState::Done;
    }

    pub const fn truncate(&mut self) {
        self.state = EpisodeState::Truncated;
    }

    /// Truncate if `max_steps` is reached. `0` means no limit.
    pub fn check_truncation(&mut self, max_steps: u32) -> bool {
        if max_steps > 0 && self.step_count >= max_steps && self.state == EpisodeState::Running {
            self.state = EpisodeState::Truncated;
            return true;
        }
        false
    }

    /// Settle the episode at a tick boundary: `Done` if the arena finished,
    /// otherwise `Truncated` if the cap was hit. Returns whether it ended.
    pub fn settle(&mut self, arena_done: bool, max_steps: u32) -> bool {
        if !self.is_running() {
            return self.is_done();
        }
        if arena_done {
            self.terminate();
            return true;
        }
        self.check_truncation(max_steps)
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.state.is_terminal()
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.state.is_running()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
