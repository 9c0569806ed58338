//! Fixed-cadence episode scheduler.
//!
//! [`EpisodeScheduler`] owns one [`Arena`] and one [`PeerLink`]. After the
//! handshake (`INIT` with the board size) each tick:
//!
//! 1. settles the episode: if the arena is done or the step cap is reached,
//!    it reports the episode, waits the inter-episode pause, then resets the
//!    arena and sends `RESET`, or finishes the run after the last episode;
//! 2. otherwise sends `STATE`, waits up to one cadence for an `ACTION`
//!    (random fallback on silence), applies it and sleeps out the rest of
//!    the cadence.
//!
//! Cadence, pause, stop and episode reset are driven from any thread through
//! a cloneable [`SchedulerControl`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use serpent_core::config::{
    DEFAULT_STEP_DELAY_MS, RunPlan, STEP_DELAY_INCREMENT_MS, clamp_step_delay,
};
use serpent_core::error::ConfigError;
use serpent_core::seed::SeedHierarchy;
use serpent_env::arena::Arena;
use serpent_env::episode::Episode;
use serpent_env::stats::EpisodeStats;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::link::{ActionOrigin, PeerLink, fetch_action_or_fallback};
use crate::observer::{RunObserver, TickReport};
use crate::protocol::{Message, StatePayload};
use crate::state_machine::{InvalidTransition, SchedulerEvent, SchedulerMachine, SchedulerState};
use crate::transport::TransportError;

/// How often a paused or pausing scheduler re-checks its controls.
const CONTROL_POLL: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// SchedulerControl
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ControlState {
    step_delay_ms: AtomicU64,
    paused: AtomicBool,
    stop: AtomicBool,
    reset: AtomicBool,
}

/// Thread-safe handle for steering a running scheduler.
///
/// Cadence changes take effect on the next tick; a wait already in flight
/// keeps its original bound.
///
/// # Example
///
/// ```
/// use serpent_gym::scheduler::SchedulerControl;
///
/// let control = SchedulerControl::new(50);
/// assert_eq!(control.speed_up(), 40);
/// assert_eq!(control.slow_down(), 50);
/// assert_eq!(control.set_step_delay(1), 5);
/// ```
#[derive(Debug, Clone)]
pub struct SchedulerControl {
    inner: Arc<ControlState>,
}

impl Default for SchedulerControl {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_DELAY_MS)
    }
}

impl SchedulerControl {
    #[must_use]
    pub fn new(step_delay_ms: u64) -> Self {
        Self {
            inner: Arc::new(ControlState {
                step_delay_ms: AtomicU64::new(clamp_step_delay(step_delay_ms)),
                paused: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                reset: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn step_delay_ms(&self) -> u64 {
        self.inner.step_delay_ms.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms())
    }

    /// Set the cadence, clamped to the supported range. Returns the value
    /// actually stored.
    pub fn set_step_delay(&self, delay_ms: u64) -> u64 {
        let delay = clamp_step_delay(delay_ms);
        self.inner.step_delay_ms.store(delay, Ordering::Relaxed);
        delay
    }

    fn adjust(&self, f: impl Fn(u64) -> u64) -> u64 {
        let mut current = self.step_delay_ms();
        loop {
            let next = clamp_step_delay(f(current));
            match self.inner.step_delay_ms.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Shorten the cadence by one increment.
    pub fn speed_up(&self) -> u64 {
        self.adjust(|d| d.saturating_sub(STEP_DELAY_INCREMENT_MS))
    }

    /// Lengthen the cadence by one increment.
    pub fn slow_down(&self) -> u64 {
        self.adjust(|d| d.saturating_add(STEP_DELAY_INCREMENT_MS))
    }

    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    /// End the run at the next tick boundary.
    pub fn stop(&self) {
        self.inner.stop.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::Acquire)
    }

    /// Restart the current episode at the next tick, resuming if paused.
    pub fn request_reset(&self) {
        self.inner.reset.store(true, Ordering::Release);
        self.resume();
    }

    fn take_reset_request(&self) -> bool {
        self.inner.reset.swap(false, Ordering::AcqRel)
    }

    fn clear_requests(&self) {
        self.inner.stop.store(false, Ordering::Release);
        self.inner.reset.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Errors and results
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RunFailure {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    State(#[from] InvalidTransition),
}

/// A run that was aborted, with the episode and tick it failed in.
#[derive(Debug, Error)]
#[error("Run aborted in episode {episode} at tick {tick}: {source}")]
pub struct RunError {
    /// 1-based episode index; `0` before the first episode started.
    pub episode: u32,
    /// 1-based tick within the episode; `0` outside a tick.
    pub tick: u32,
    #[source]
    pub source: RunFailure,
}

impl RunError {
    fn new(episode: u32, tick: u32, source: impl Into<RunFailure>) -> Self {
        Self {
            episode,
            tick,
            source: source.into(),
        }
    }

    /// Whether the run never started because the plan was invalid.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self.source, RunFailure::Config(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// Every planned episode ran.
    Completed,
    /// Stopped through [`SchedulerControl::stop`].
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub stats: EpisodeStats,
    pub total_ticks: u64,
    pub peer_actions: u64,
    pub fallback_actions: u64,
}

// ---------------------------------------------------------------------------
// EpisodeScheduler
// ---------------------------------------------------------------------------

/// Drives an [`Arena`] from a [`PeerLink`] at a fixed cadence.
///
/// # Example
///
/// ```
/// use serpent_core::config::{ArenaConfig, RunPlan};
/// use serpent_env::arena::Arena;
/// use serpent_gym::link::OfflineLink;
/// use serpent_gym::scheduler::{EpisodeScheduler, RunOutcome};
///
/// let arena = Arena::new(&ArenaConfig::default().with_seed(7)).unwrap();
/// let mut scheduler = EpisodeScheduler::new(arena, OfflineLink).with_seed(7);
/// let plan = RunPlan::default()
///     .with_episodes(2)
///     .with_max_steps(3)
///     .with_step_delay_ms(5)
///     .with_episode_pause_ms(0);
/// let summary = scheduler.start(&plan).unwrap();
/// assert_eq!(summary.outcome, RunOutcome::Completed);
/// assert_eq!(summary.stats.episodes_completed, 2);
/// ```
pub struct EpisodeScheduler<L: PeerLink> {
    arena: Arena,
    link: L,
    machine: SchedulerMachine,
    control: SchedulerControl,
    episode: Episode,
    stats: EpisodeStats,
    rng: ChaCha8Rng,
    observers: Vec<Box<dyn RunObserver>>,
    total_ticks: u64,
    peer_actions: u64,
    fallback_actions: u64,
}

impl<L: PeerLink> EpisodeScheduler<L> {
    /// Fallback actions draw from OS entropy unless [`with_seed`](Self::with_seed) is used.
    pub fn new(arena: Arena, link: L) -> Self {
        Self {
            arena,
            link,
            machine: SchedulerMachine::new(),
            control: SchedulerControl::default(),
            episode: Episode::default(),
            stats: EpisodeStats::new(),
            rng: SeedHierarchy::from_entropy().subsystem_rng("fallback"),
            observers: Vec::new(),
            total_ticks: 0,
            peer_actions: 0,
            fallback_actions: 0,
        }
    }

    /// Builder: seed the fallback action stream.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SeedHierarchy::new(seed).subsystem_rng("fallback");
        self
    }

    /// Builder: share an existing control handle.
    #[must_use]
    pub fn with_control(mut self, control: SchedulerControl) -> Self {
        self.control = control;
        self
    }

    /// Builder: add an observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn RunObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn add_observer(&mut self, observer: Box<dyn RunObserver>) {
        self.observers.push(observer);
    }

    /// A handle for steering this scheduler from another thread.
    #[must_use]
    pub fn control(&self) -> SchedulerControl {
        self.control.clone()
    }

    #[must_use]
    pub const fn arena(&self) -> &Arena {
        &self.arena
    }

    #[must_use]
    pub const fn link(&self) -> &L {
        &self.link
    }

    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.machine.state()
    }

    #[must_use]
    pub const fn episode(&self) -> &Episode {
        &self.episode
    }

    #[must_use]
    pub const fn stats(&self) -> &EpisodeStats {
        &self.stats
    }

    /// Release the link.
    pub fn close(&mut self) {
        self.link.close();
    }

    // -- run --

    /// Run `plan` to completion.
    ///
    /// The plan is validated before anything else happens; an invalid plan
    /// leaves the scheduler idle. Any transport or protocol failure aborts
    /// the run and is returned with episode and tick context.
    pub fn start(&mut self, plan: &RunPlan) -> Result<RunSummary, RunError> {
        plan.validate().map_err(|e| RunError::new(0, 0, e))?;
        if self.machine.state() == SchedulerState::Finished {
            self.machine
                .apply(SchedulerEvent::Rearm)
                .map_err(|e| RunError::new(0, 0, e))?;
        }
        self.machine
            .apply(SchedulerEvent::Start)
            .map_err(|e| RunError::new(0, 0, e))?;

        self.control.clear_requests();
        self.control.set_step_delay(plan.step_delay_ms);
        self.episode = Episode::default();
        self.stats.reset();
        self.total_ticks = 0;
        self.peer_actions = 0;
        self.fallback_actions = 0;

        match self.run(plan) {
            Ok(outcome) => {
                let summary = RunSummary {
                    outcome,
                    stats: self.stats.clone(),
                    total_ticks: self.total_ticks,
                    peer_actions: self.peer_actions,
                    fallback_actions: self.fallback_actions,
                };
                for observer in &mut self.observers {
                    observer.on_run_end(&summary);
                }
                Ok(summary)
            }
            Err(err) => {
                self.machine.abort();
                warn!(episode = err.episode, tick = err.tick, error = %err.source, "run aborted");
                Err(err)
            }
        }
    }

    fn run(&mut self, plan: &RunPlan) -> Result<RunOutcome, RunError> {
        let board_size = self.arena.board_size();
        info!(link = self.link.name(), "waiting for peer");
        self.link.attach().map_err(|e| self.fail(e))?;
        self.link
            .send(&Message::init(board_size))
            .map_err(|e| self.fail(e))?;
        self.advance(SchedulerEvent::PeerReady)?;
        info!(board_size, link = self.link.name(), "peer attached, INIT sent");
        for observer in &mut self.observers {
            observer.on_attach(board_size);
        }

        self.arena.reset();
        self.episode.reset();
        self.notify_episode_start();

        loop {
            if self.control.is_stop_requested() {
                self.advance(SchedulerEvent::Finish)?;
                info!(episode = self.episode.episode_number, "run stopped");
                return Ok(RunOutcome::Stopped);
            }
            if self.control.take_reset_request() {
                self.reset_episode()?;
            }
            if self.control.is_paused() {
                if self.machine.state() != SchedulerState::Paused {
                    self.advance(SchedulerEvent::Pause)?;
                    info!(episode = self.episode.episode_number, "paused");
                }
                std::thread::sleep(CONTROL_POLL);
                continue;
            }
            if self.machine.state() == SchedulerState::Paused {
                self.advance(SchedulerEvent::Resume)?;
                info!(episode = self.episode.episode_number, "resumed");
            }

            if self
                .episode
                .settle(self.arena.done(), plan.max_steps_per_episode)
            {
                if self.end_episode(plan)? {
                    self.advance(SchedulerEvent::Finish)?;
                    return Ok(RunOutcome::Completed);
                }
                continue;
            }

            self.tick()?;
        }
    }

    /// Close out the current episode. Returns `true` when the run is over.
    fn end_episode(&mut self, plan: &RunPlan) -> Result<bool, RunError> {
        self.advance(SchedulerEvent::BoundaryReached)?;
        self.stats.record(&self.episode);
        if let Some(record) = self.stats.history.last() {
            for observer in &mut self.observers {
                observer.on_episode_end(record);
            }
        }
        info!(
            episode = self.episode.episode_number,
            steps = self.episode.step_count,
            reward = self.episode.total_reward,
            outcome = self.episode.state.label(),
            "episode ended"
        );

        if self.episode.episode_number >= plan.episodes {
            return Ok(true);
        }

        self.wait_unless_stopped(plan.episode_pause());
        if self.control.is_stop_requested() {
            return Ok(false);
        }

        // The boundary reset already gives a fresh episode.
        if self.control.take_reset_request() {
            debug!(
                episode = self.episode.episode_number,
                "reset request absorbed by boundary"
            );
        }
        self.arena.reset();
        self.episode.reset();
        self.link.send(&Message::reset()).map_err(|e| self.fail(e))?;
        self.advance(SchedulerEvent::NextEpisode)?;
        self.notify_episode_start();
        Ok(false)
    }

    /// Restart the current episode immediately: the arena is reset, the
    /// counters are zeroed and the peer is sent `RESET`. The episode index
    /// does not advance and nothing is recorded.
    pub fn reset_episode(&mut self) -> Result<(), RunError> {
        self.arena.reset();
        self.episode.restart();
        if self.machine.state().is_running() {
            self.link.send(&Message::reset()).map_err(|e| self.fail(e))?;
        }
        info!(episode = self.episode.episode_number, "episode reset on request");
        self.notify_episode_start();
        Ok(())
    }

    fn tick(&mut self) -> Result<(), RunError> {
        let started = Instant::now();
        let cadence = self.control.step_delay();

        let state = StatePayload::from_snapshot(&self.arena.snapshot());
        self.link
            .send(&Message::state(&state))
            .map_err(|e| self.fail(e))?;
        let choice = fetch_action_or_fallback(&mut self.link, cadence, &mut self.rng)
            .map_err(|e| self.fail(e))?;

        let transition = self.arena.apply_action(choice.action);
        let reward = self.arena.reward();
        self.episode.advance(reward);
        self.total_ticks += 1;
        match choice.origin {
            ActionOrigin::Peer => self.peer_actions += 1,
            ActionOrigin::Fallback => self.fallback_actions += 1,
        }

        debug!(
            episode = self.episode.episode_number,
            step = self.episode.step_count,
            action = choice.action,
            origin = ?choice.origin,
            ?transition,
            reward,
            "tick"
        );

        if !self.observers.is_empty() {
            let report = TickReport {
                episode: self.episode.episode_number,
                step: self.episode.step_count,
                action: choice.action,
                origin: choice.origin,
                transition,
                reward,
                episode_reward: self.episode.total_reward,
            };
            let snapshot = self.arena.snapshot();
            for observer in &mut self.observers {
                observer.on_tick(&report, &snapshot);
            }
        }

        if let Some(rest) = cadence.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
        Ok(())
    }

    // -- helpers --

    fn advance(&mut self, event: SchedulerEvent) -> Result<SchedulerState, RunError> {
        self.machine.apply(event).map_err(|e| self.fail(e))
    }

    fn fail(&self, source: impl Into<RunFailure>) -> RunError {
        let tick = self.episode.step_count + u32::from(self.episode.is_running());
        RunError::new(self.episode.episode_number, tick, source)
    }

    fn notify_episode_start(&mut self) {
        if self.observers.is_empty() {
            return;
        }
        let snapshot = self.arena.snapshot();
        for observer in &mut self.observers {
            observer.on_episode_start(self.episode.episode_number, &snapshot);
        }
    }

    fn wait_unless_stopped(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            let now = Instant::now();
            if now >= deadline || self.control.is_stop_requested() {
                return;
            }
            std::thread::sleep(CONTROL_POLL.min(deadline - now));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::OfflineLink;
    use crate::observer::{ArenaEvent, ChannelObserver};
    use crate::protocol::MessageKind;
    use serpent_core::config::{ArenaConfig, MAX_STEP_DELAY_MS, MIN_STEP_DELAY_MS};
    use serpent_core::types::Direction;
    use serpent_env::episode::EpisodeState;
    use serpent_env::stats::EpisodeRecord;

    /// How a [`Peer`] answers each `STATE`.
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Reply {
        Straight,
        Reverse,
        Silent,
    }

    /// In-process peer that records what it was sent.
    struct Peer {
        reply: Reply,
        sent: Vec<Message>,
        pending: Option<i64>,
        fail_at_send: Option<usize>,
    }

    impl Peer {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                sent: Vec::new(),
                pending: None,
                fail_at_send: None,
            }
        }

        fn kinds(&self) -> Vec<MessageKind> {
            self.sent.iter().map(Message::kind).collect()
        }

        fn count(&self, kind: MessageKind) -> usize {
            self.sent.iter().filter(|m| m.kind() == kind).count()
        }
    }

    impl PeerLink for Peer {
        fn attach(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn send(&mut self, msg: &Message) -> Result<(), TransportError> {
            if self.fail_at_send == Some(self.sent.len()) {
                return Err(TransportError::PeerClosed);
            }
            if msg.kind() == MessageKind::State {
                let heading = Direction::from_action(msg.get_i64("direction")?);
                self.pending = match self.reply {
                    Reply::Straight => Some(i64::from(heading.index())),
                    Reply::Reverse => Some(i64::from(heading.opposite().index())),
                    Reply::Silent => None,
                };
            }
            self.sent.push(msg.clone());
            Ok(())
        }

        fn poll_action(&mut self, _timeout: Duration) -> Result<Option<i64>, TransportError> {
            Ok(self.pending.take())
        }

        fn name(&self) -> &'static str {
            "test"
        }
    }

    fn arena() -> Arena {
        Arena::new(&ArenaConfig::default().with_seed(1)).unwrap()
    }

    fn quick_plan(episodes: u32, max_steps: u32) -> RunPlan {
        RunPlan::default()
            .with_episodes(episodes)
            .with_max_steps(max_steps)
            .with_step_delay_ms(MIN_STEP_DELAY_MS)
            .with_episode_pause_ms(0)
    }

    // -- control --

    #[test]
    fn control_speed_is_clamped() {
        let control = SchedulerControl::new(MIN_STEP_DELAY_MS + 3);
        assert_eq!(control.speed_up(), MIN_STEP_DELAY_MS);
        assert_eq!(control.speed_up(), MIN_STEP_DELAY_MS);
        control.set_step_delay(MAX_STEP_DELAY_MS);
        assert_eq!(control.slow_down(), MAX_STEP_DELAY_MS);
        assert_eq!(control.step_delay(), Duration::from_millis(MAX_STEP_DELAY_MS));
    }

    #[test]
    fn control_reset_resumes() {
        let control = SchedulerControl::default();
        control.pause();
        assert!(control.is_paused());
        control.request_reset();
        assert!(!control.is_paused());
        assert!(control.take_reset_request());
        assert!(!control.take_reset_request());
    }

    // -- validation --

    #[test]
    fn invalid_plan_never_leaves_idle() {
        let mut scheduler = EpisodeScheduler::new(arena(), Peer::new(Reply::Straight));
        let err = scheduler.start(&quick_plan(0, 5)).unwrap_err();
        assert!(err.is_config());
        assert_eq!(err.episode, 0);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(scheduler.link().sent.is_empty());
    }

    // -- handshake and ticks --

    #[test]
    fn init_precedes_first_state() {
        let mut scheduler = EpisodeScheduler::new(arena(), Peer::new(Reply::Straight));
        scheduler.start(&quick_plan(1, 2)).unwrap();
        let link = scheduler.link();
        assert_eq!(
            link.kinds(),
            vec![MessageKind::Init, MessageKind::State, MessageKind::State]
        );
        assert_eq!(link.sent[0].board_size().unwrap(), 20);
    }

    #[test]
    fn silence_falls_back_to_random_actions() {
        let mut scheduler = EpisodeScheduler::new(arena(), OfflineLink).with_seed(5);
        let summary = scheduler.start(&quick_plan(2, 4)).unwrap();
        assert_eq!(summary.peer_actions, 0);
        assert!(summary.total_ticks > 0);
        assert_eq!(summary.fallback_actions, summary.total_ticks);
    }

    #[test]
    fn silent_peer_still_receives_state() {
        let mut scheduler =
            EpisodeScheduler::new(arena(), Peer::new(Reply::Silent)).with_seed(5);
        let summary = scheduler.start(&quick_plan(1, 3)).unwrap();
        assert_eq!(
            scheduler.link().count(MessageKind::State) as u64,
            summary.total_ticks
        );
    }

    // -- episode boundaries --

    #[test]
    fn truncation_by_step_count() {
        // Straight from the centre of a 20x20 board survives at least nine
        // ticks.
        let mut scheduler = EpisodeScheduler::new(arena(), Peer::new(Reply::Straight));
        let summary = scheduler.start(&quick_plan(1, 5)).unwrap();
        assert_eq!(summary.stats.episodes_completed, 1);
        let record = &summary.stats.history[0];
        assert_eq!(record.steps, 5);
        assert_eq!(record.outcome, EpisodeState::Truncated);
        assert_eq!(summary.peer_actions, 5);
    }

    #[test]
    fn done_ends_episode_before_cap() {
        let mut scheduler = EpisodeScheduler::new(arena(), Peer::new(Reply::Reverse));
        let summary = scheduler.start(&quick_plan(1, 50)).unwrap();
        let record = &summary.stats.history[0];
        assert_eq!(record.outcome, EpisodeState::Done);
        assert_eq!(record.steps, 1);
        assert!((record.reward + 10.0).abs() < 1e-9);
    }

    #[test]
    fn straight_run_hits_the_wall() {
        let mut scheduler = EpisodeScheduler::new(arena(), Peer::new(Reply::Straight));
        let summary = scheduler.start(&quick_plan(1, 0)).unwrap();
        let record = &summary.stats.history[0];
        assert_eq!(record.outcome, EpisodeState::Done);
        assert!((10..=11).contains(&record.steps));
    }

    #[test]
    fn episodes_advance_with_reset_messages() {
        let mut scheduler = EpisodeScheduler::new(arena(), Peer::new(Reply::Straight));
        let summary = scheduler.start(&quick_plan(3, 2)).unwrap();
        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.stats.episodes_completed, 3);
        assert_eq!(summary.total_ticks, 6);
        assert_eq!(scheduler.link().count(MessageKind::Reset), 2);
        assert_eq!(scheduler.state(), SchedulerState::Finished);
    }

    #[test]
    fn rerun_after_finish() {
        let mut scheduler = EpisodeScheduler::new(arena(), OfflineLink).with_seed(6);
        scheduler.start(&quick_plan(1, 2)).unwrap();
        let summary = scheduler.start(&quick_plan(1, 3)).unwrap();
        assert_eq!(summary.stats.episodes_completed, 1);
        assert!(summary.total_ticks <= 3);
    }

    // -- failures --

    #[test]
    fn transport_failure_aborts_with_context() {
        let mut peer = Peer::new(Reply::Straight);
        // INIT, STATE, STATE succeed; the STATE of tick 3 fails.
        peer.fail_at_send = Some(3);
        let mut scheduler = EpisodeScheduler::new(arena(), peer);
        let err = scheduler.start(&quick_plan(1, 0)).unwrap_err();
        assert_eq!(err.episode, 1);
        assert_eq!(err.tick, 3);
        assert!(matches!(
            err.source,
            RunFailure::Transport(TransportError::PeerClosed)
        ));
        assert_eq!(scheduler.state(), SchedulerState::Finished);
        assert!(err.to_string().starts_with("Run aborted in episode 1 at tick 3"));
    }

    // -- control during a run --

    #[test]
    fn stop_ends_run() {
        let (observer, events) = ChannelObserver::unbounded();
        let mut scheduler = EpisodeScheduler::new(arena(), OfflineLink)
            .with_seed(10)
            .with_observer(Box::new(observer));
        let control = scheduler.control();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(40));
            control.stop();
        });
        let summary = scheduler.start(&quick_plan(100_000, 0)).unwrap();
        stopper.join().unwrap();
        assert_eq!(summary.outcome, RunOutcome::Stopped);
        assert!(events.try_iter().any(|e| matches!(
            e,
            ArenaEvent::Finished {
                outcome: RunOutcome::Stopped,
                ..
            }
        )));
    }

    #[test]
    fn pause_holds_ticks() {
        let mut scheduler = EpisodeScheduler::new(arena(), OfflineLink).with_seed(11);
        let control = scheduler.control();
        control.pause();
        let driver = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            control.stop();
        });
        // Requests are cleared on start, but pause is a standing flag.
        let summary = scheduler.start(&quick_plan(5, 0)).unwrap();
        driver.join().unwrap();
        assert_eq!(summary.outcome, RunOutcome::Stopped);
        assert_eq!(summary.total_ticks, 0);
    }

    #[test]
    fn reset_request_restarts_episode() {
        let mut scheduler = EpisodeScheduler::new(arena(), Peer::new(Reply::Straight));
        let control = scheduler.control();
        control.pause();
        let driver = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            control.request_reset();
        });
        let summary = scheduler.start(&quick_plan(1, 3)).unwrap();
        driver.join().unwrap();
        assert_eq!(summary.stats.episodes_completed, 1);
        assert_eq!(summary.stats.history[0].episode, 1);
        assert_eq!(scheduler.link().count(MessageKind::Reset), 1);
    }

    /// Requests a reset whenever an episode ends.
    struct ResetOnEpisodeEnd(SchedulerControl);

    impl RunObserver for ResetOnEpisodeEnd {
        fn on_episode_end(&mut self, _record: &EpisodeRecord) {
            self.0.request_reset();
        }
    }

    #[test]
    fn reset_request_at_boundary_is_absorbed() {
        let mut scheduler = EpisodeScheduler::new(arena(), Peer::new(Reply::Straight));
        scheduler.add_observer(Box::new(ResetOnEpisodeEnd(scheduler.control())));
        let plan = quick_plan(2, 2).with_episode_pause_ms(20);
        let summary = scheduler.start(&plan).unwrap();

        assert_eq!(summary.stats.episodes_completed, 2);
        assert_eq!(summary.total_ticks, 4);
        assert!(summary.stats.history.iter().all(|r| r.steps == 2));
        assert_eq!(scheduler.link().count(MessageKind::Reset), 1);
    }
}
