//! Cumulative statistics across episodes of one run.

use serde::Serialize;

use crate::episode::{Episode, EpisodeState};

/// One finished episode.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EpisodeRecord {
    pub episode: u32,
    pub steps: u32,
    pub reward: f64,
    pub outcome: EpisodeState,
}

/// Per-run statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EpisodeStats {
    pub episodes_completed: u32,
    pub total_steps: u64,
    pub history: Vec<EpisodeRecord>,
}

impl EpisodeStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            episodes_completed: 0,
            total_steps: 0,
            history: Vec::new(),
        }
    }

    /// Record a finished episode. Episodes that are still running are ignored.
    pub fn record(&mut self, episode: &Episode) -> bool {
        if !episode.is_done() {
            return false;
        }
        self.episodes_completed += 1;
        self.total_steps += u64::from(episode.step_count);
        self.history.push(EpisodeRecord {
            episode: episode.episode_number,
            steps: episode.step_count,
            reward: episode.total_reward,
            outcome: episode.state,
        });
        true
    }

    /// Average episode length (steps) across all completed episodes.
    #[must_use]
    pub fn mean_episode_length(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let sum: f64 = self.history.iter().map(|r| f64::from(r.steps)).sum();
        #[allow(clippy::cast_precision_loss)]
        Some(sum / self.history.len() as f64)
    }

    #[must_use]
    pub fn mean_reward(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let sum: f64 = self.history.iter().map(|r| r.reward).sum();
        #[allow(clippy::cast_precision_loss)]
        Some(sum / self.history.len() as f64)
    }

    #[must_use]
    pub fn best_reward(&self) -> Option<f64> {
        self.history.iter().map(|r| r.reward).reduce(f64::max)
    }

    /// Episodes that ended on the step cap rather than in the arena.
    #[must_use]
    pub fn truncated_count(&self) -> usize {
        self.history
            .iter()
            .filter(|r| r.outcome == EpisodeState::Truncated)
            .count()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
