//! Read-only collaborators notified by the scheduler.
//!
//! A rendering surface wants a board snapshot after every tick; a status
//! reporter wants counters and cumulative reward. Both see owned copies,
//! never the live arena.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serpent_env::arena::{ArenaSnapshot, Transition};
use serpent_env::stats::EpisodeRecord;
use tracing::info;

use crate::link::ActionOrigin;
use crate::scheduler::{RunOutcome, RunSummary};

/// Counters for one applied tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// 1-based episode index.
    pub episode: u32,
    /// Steps applied in this episode, including this one.
    pub step: u32,
    pub action: i64,
    pub origin: ActionOrigin,
    pub transition: Transition,
    pub reward: f64,
    /// Reward accumulated in this episode so far.
    pub episode_reward: f64,
}

/// Receives scheduler notifications. Every method defaults to a no-op.
pub trait RunObserver: Send {
    fn on_attach(&mut self, _board_size: usize) {}

    fn on_episode_start(&mut self, _episode: u32, _snapshot: &ArenaSnapshot) {}

    fn on_tick(&mut self, _report: &TickReport, _snapshot: &ArenaSnapshot) {}

    fn on_episode_end(&mut self, _record: &EpisodeRecord) {}

    fn on_run_end(&mut self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// TracingObserver
// ---------------------------------------------------------------------------

/// Status reporter that logs episode results.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn on_episode_end(&mut self, record: &EpisodeRecord) {
        info!(
            episode = record.episode,
            steps = record.steps,
            reward = record.reward,
            outcome = record.outcome.label(),
            "episode finished"
        );
    }

    fn on_run_end(&mut self, summary: &RunSummary) {
        info!(
            outcome = ?summary.outcome,
            episodes = summary.stats.episodes_completed,
            ticks = summary.total_ticks,
            fallbacks = summary.fallback_actions,
            mean_reward = summary.stats.mean_reward().unwrap_or(0.0),
            "run finished"
        );
    }
}

// ---------------------------------------------------------------------------
// ChannelObserver
// ---------------------------------------------------------------------------

/// Event forwarded to a UI or monitor thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ArenaEvent {
    Attached { board_size: usize },
    EpisodeStarted { episode: u32, snapshot: ArenaSnapshot },
    Tick { report: TickReport, snapshot: ArenaSnapshot },
    EpisodeEnded(EpisodeRecord),
    Finished { outcome: RunOutcome, episodes: u32 },
}

/// Forwards events over a `crossbeam` channel.
///
/// Sends never block: when a bounded channel is full, or the receiver is
/// gone, the event is dropped and counted.
#[derive(Debug)]
pub struct ChannelObserver {
    sender: Sender<ArenaEvent>,
    dropped: u64,
}

impl ChannelObserver {
    /// Observer backed by a channel holding at most `capacity` events.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<ArenaEvent>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (Self { sender, dropped: 0 }, receiver)
    }

    #[must_use]
    pub fn unbounded() -> (Self, Receiver<ArenaEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender, dropped: 0 }, receiver)
    }

    /// Events that could not be delivered.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    fn forward(&mut self, event: ArenaEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => self.dropped += 1,
        }
    }
}

impl RunObserver for ChannelObserver {
    fn on_attach(&mut self, board_size: usize) {
        self.forward(ArenaEvent::Attached { board_size });
    }

    fn on_episode_start(&mut self, episode: u32, snapshot: &ArenaSnapshot) {
        self.forward(ArenaEvent::EpisodeStarted {
            episode,
            snapshot: snapshot.clone(),
        });
    }

    fn on_tick(&mut self, report: &TickReport, snapshot: &ArenaSnapshot) {
        self.forward(ArenaEvent::Tick {
            report: *report,
            snapshot: snapshot.clone(),
        });
    }

    fn on_episode_end(&mut self, record: &EpisodeRecord) {
        self.forward(ArenaEvent::EpisodeEnded(record.clone()));
    }

    fn on_run_end(&mut self, summary: &RunSummary) {
        self.forward(ArenaEvent::Finished {
            outcome: summary.outcome,
            episodes: summary.stats.episodes_completed,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
