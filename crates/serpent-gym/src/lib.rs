//! Wire protocol, TCP transport and episode scheduler for the serpent arena.
//!
//! This crate connects an [`Arena`](serpent_env::arena::Arena) to an external
//! decision process:
//!
//! - [`protocol`]: message kinds, typed payloads and accessors
//! - [`framing`]: newline-delimited JSON records
//! - [`transport`]: [`Transport`], a single-peer TCP endpoint with read timeouts
//! - [`link`]: the [`PeerLink`] strategy (socket, file polling, offline)
//! - [`state_machine`]: [`SchedulerMachine`] guarding the run lifecycle
//! - [`scheduler`]: [`EpisodeScheduler`], the fixed-cadence tick loop
//! - [`observer`]: read-only collaborators notified every tick
//! - [`agent_config`]: the JSON file handed to the agent launcher
//!
//! A session starts with `INIT { board_size }`, then alternates
//! `STATE` / `ACTION` once per tick, with `RESET` between episodes.

pub mod agent_config;
pub mod framing;
pub mod link;
pub mod observer;
pub mod protocol;
pub mod scheduler;
pub mod state_machine;
pub mod transport;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use agent_config::AgentConfig;
pub use link::{ActionOrigin, FileLink, OfflineLink, PeerLink};
pub use observer::{ArenaEvent, ChannelObserver, RunObserver, TracingObserver};
pub use protocol::{Message, MessageKind, ProtocolError, StatePayload};
pub use scheduler::{EpisodeScheduler, RunError, RunOutcome, RunSummary, SchedulerControl};
pub use state_machine::{SchedulerMachine, SchedulerState};
pub use transport::{CloseHandle, Incoming, Transport, TransportError};

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        AgentConfig, ArenaEvent, ChannelObserver, EpisodeScheduler, FileLink, Incoming, Message,
        MessageKind, OfflineLink, PeerLink, ProtocolError, RunError, RunObserver, RunOutcome,
        RunSummary, SchedulerControl, SchedulerState, StatePayload, TracingObserver, Transport,
        TransportError,
    };
}
