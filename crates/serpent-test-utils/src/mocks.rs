//! In-process stand-ins for the scheduler's collaborators.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serpent_env::arena::ArenaSnapshot;
use serpent_env::stats::EpisodeRecord;
use serpent_gym::link::PeerLink;
use serpent_gym::observer::{RunObserver, TickReport};
use serpent_gym::protocol::{Message, MessageKind};
use serpent_gym::scheduler::RunSummary;
use serpent_gym::transport::TransportError;

// ---------------------------------------------------------------------------
// ScriptedLink
// ---------------------------------------------------------------------------

/// A [`PeerLink`] that answers from a fixed script and records every
/// message it is sent.
///
/// Each entry of the script answers one action poll; `None` is silence.
/// Once the script runs out the link stays silent.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    script: VecDeque<Option<i64>>,
    sent: Vec<Message>,
    attached: bool,
}

impl ScriptedLink {
    pub fn new(script: impl IntoIterator<Item = Option<i64>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::default()
        }
    }

    /// A link answering every poll with `action`, `times` times.
    pub fn repeating(action: i64, times: usize) -> Self {
        Self::new(std::iter::repeat_n(Some(action), times))
    }

    pub fn sent(&self) -> &[Message] {
        &self.sent
    }

    pub fn sent_kinds(&self) -> Vec<MessageKind> {
        self.sent.iter().map(Message::kind).collect()
    }

    pub fn count(&self, kind: MessageKind) -> usize {
        self.sent.iter().filter(|m| m.kind() == kind).count()
    }

    pub const fn attached(&self) -> bool {
        self.attached
    }
}

impl PeerLink for ScriptedLink {
    fn attach(&mut self) -> Result<(), TransportError> {
        self.attached = true;
        Ok(())
    }

    fn send(&mut self, msg: &Message) -> Result<(), TransportError> {
        self.sent.push(msg.clone());
        Ok(())
    }

    fn poll_action(&mut self, _timeout: Duration) -> Result<Option<i64>, TransportError> {
        Ok(self.script.pop_front().flatten())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// RecordingObserver
// ---------------------------------------------------------------------------

/// Everything a [`RecordingObserver`] saw.
#[derive(Debug, Default, Clone)]
pub struct Recording {
    pub attached: Option<usize>,
    pub episodes_started: Vec<u32>,
    pub ticks: Vec<TickReport>,
    pub snapshots: Vec<ArenaSnapshot>,
    pub episodes_ended: Vec<EpisodeRecord>,
    pub summary: Option<RunSummary>,
}

/// Observer that stores every notification behind a shared handle, so the
/// test can inspect it after the scheduler took ownership.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of what has been recorded so far.
    pub fn recording(&self) -> Recording {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with(&self, f: impl FnOnce(&mut Recording)) {
        f(&mut self.inner.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl RunObserver for RecordingObserver {
    fn on_attach(&mut self, board_size: usize) {
        self.with(|r| r.attached = Some(board_size));
    }

    fn on_episode_start(&mut self, episode: u32, _snapshot: &ArenaSnapshot) {
        self.with(|r| r.episodes_started.push(episode));
    }

    fn on_tick(&mut self, report: &TickReport, snapshot: &ArenaSnapshot) {
        self.with(|r| {
            r.ticks.push(*report);
            r.snapshots.push(snapshot.clone());
        });
    }

    fn on_episode_end(&mut self, record: &EpisodeRecord) {
        self.with(|r| r.episodes_ended.push(record.clone()));
    }

    fn on_run_end(&mut self, summary: &RunSummary) {
        self.with(|r| r.summary = Some(summary.clone()));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
