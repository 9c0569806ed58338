//! Scheduler state machine enforcing valid lifecycle transitions.
//!
//! ```text
//! Idle ─start─▶ AwaitingPeer ─peer_ready─▶ Stepping ⇄ EpisodeBoundary
//!                    │                        │  ▲            │
//!                    │                      pause resume      │
//!                    │                        ▼  │            │
//!                    │                       Paused           │
//!                    └──────────finish (from any)──────▶ Finished ─rearm─▶ Idle
//! ```

use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// SchedulerState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    #[default]
    Idle,
    /// Waiting for the peer to attach and receive `INIT`.
    AwaitingPeer,
    /// Ticking within an episode.
    Stepping,
    /// Between episodes.
    EpisodeBoundary,
    /// Ticking suspended by the operator.
    Paused,
    Finished,
}

impl SchedulerState {
    /// Whether a run is in progress past the handshake.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Stepping | Self::EpisodeBoundary | Self::Paused)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingPeer => "awaiting_peer",
            Self::Stepping => "stepping",
            Self::EpisodeBoundary => "episode_boundary",
            Self::Paused => "paused",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// SchedulerEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    Start,
    PeerReady,
    BoundaryReached,
    NextEpisode,
    Pause,
    Resume,
    Finish,
    Rearm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Event {event:?} is not valid in state {state}")]
pub struct InvalidTransition {
    pub state: SchedulerState,
    pub event: SchedulerEvent,
}

// ---------------------------------------------------------------------------
// SchedulerMachine
// ---------------------------------------------------------------------------

/// Tracks scheduler state and rejects illegal events.
///
/// # Example
///
/// ```
/// use serpent_gym::state_machine::{SchedulerEvent, SchedulerMachine, SchedulerState};
///
/// let mut sm = SchedulerMachine::new();
/// sm.apply(SchedulerEvent::Start).unwrap();
/// sm.apply(SchedulerEvent::PeerReady).unwrap();
/// assert_eq!(sm.state(), SchedulerState::Stepping);
/// assert!(sm.apply(SchedulerEvent::Start).is_err());
/// ```
#[derive(Debug, Default)]
pub struct SchedulerMachine {
    state: SchedulerState,
}

impl SchedulerMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SchedulerState::Idle,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// Apply `event`, returning the new state.
    pub const fn apply(
        &mut self,
        event: SchedulerEvent,
    ) -> Result<SchedulerState, InvalidTransition> {
        use SchedulerEvent as E;
        use SchedulerState as S;

        let next = match (self.state, event) {
            (S::Idle, E::Start) => S::AwaitingPeer,
            (S::AwaitingPeer, E::PeerReady)
            | (S::EpisodeBoundary, E::NextEpisode)
            | (S::Paused, E::Resume) => S::Stepping,
            (S::Stepping, E::BoundaryReached) => S::EpisodeBoundary,
            (S::Stepping | S::EpisodeBoundary, E::Pause) => S::Paused,
            (S::Finished, E::Rearm) => S::Idle,
            (S::AwaitingPeer | S::Stepping | S::EpisodeBoundary | S::Paused, E::Finish) => {
                S::Finished
            }
            (state, event) => return Err(InvalidTransition { state, event }),
        };
        self.state = next;
        Ok(next)
    }

    /// Move to [`Finished`](SchedulerState::Finished) from wherever we are.
    /// Used on abort; a no-op when already finished or never started.
    pub const fn abort(&mut self) {
        if !matches!(self.state, SchedulerState::Idle | SchedulerState::Finished) {
            self.state = SchedulerState::Finished;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
