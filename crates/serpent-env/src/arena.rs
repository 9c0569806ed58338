//! The arena engine: one body, one target, one discrete transition per call.
//!
//! [`Arena`] owns all grid state. It performs no I/O and holds its own RNG,
//! so a seeded arena replays identically. The [`Board`] is a projection
//! rebuilt from body and target after every mutation; callers only ever see
//! shared references or owned [`ArenaSnapshot`]s.

use std::collections::VecDeque;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serpent_core::config::ArenaConfig;
use serpent_core::error::ConfigError;
use serpent_core::seed::SeedHierarchy;
use serpent_core::types::{Board, Coord, Direction, GridCell};
use thiserror::Error;
use tracing::debug;

use crate::rewards::RewardShaping;

/// Length of the body after [`Arena::reset`].
pub const INITIAL_BODY_LEN: usize = 3;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ArenaError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// What a call to [`Arena::apply_action`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The arena was already done; nothing changed.
    Ignored,
    /// An ordinary step.
    Moved,
    /// The head reached the target and the body grew.
    Ate,
    /// The body grew to cover every cell; the episode is over.
    Filled,
    /// The head left the board.
    HitWall,
    /// The head ran into the body.
    HitBody,
}

impl Transition {
    /// Whether this transition ended the episode.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::HitWall | Self::HitBody)
    }
}

// ---------------------------------------------------------------------------
// ArenaSnapshot
// ---------------------------------------------------------------------------

/// Owned copy of the arena, safe to hand to another thread.
#[derive(Clone, Debug, PartialEq)]
pub struct ArenaSnapshot {
    pub board: Board,
    /// Head first.
    pub body: Vec<Coord>,
    pub target: Coord,
    pub direction: Direction,
    pub reward: f64,
    pub done: bool,
}

impl ArenaSnapshot {
    #[must_use]
    pub fn head(&self) -> Coord {
        self.body.first().copied().unwrap_or_default()
    }

    #[must_use]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    #[must_use]
    pub const fn board_size(&self) -> usize {
        self.board.size()
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

/// Single-body grid arena.
///
/// # Example
///
/// ```
/// use serpent_core::config::ArenaConfig;
/// use serpent_env::arena::Arena;
///
/// let mut arena = Arena::new(&ArenaConfig::default().with_seed(1)).unwrap();
/// assert_eq!(arena.body_len(), 3);
/// assert!(!arena.done());
///
/// // Moving straight ahead from the start position is always safe.
/// arena.apply_action(arena.direction().index().into());
/// assert!(!arena.done());
/// ```
#[derive(Debug, Clone)]
pub struct Arena {
    size: usize,
    body: VecDeque<Coord>,
    target: Coord,
    direction: Direction,
    last_direction: Direction,
    done: bool,
    reward: f64,
    wrap_walls: bool,
    block_reversal: bool,
    shaping: RewardShaping,
    board: Board,
    rng: ChaCha8Rng,
}

impl Arena {
    /// Build and reset an arena. The RNG is seeded from `config.seed`, or
    /// from OS entropy when unset.
    pub fn new(config: &ArenaConfig) -> Result<Self, ArenaError> {
        config.validate()?;
        let seeds = SeedHierarchy::from_option(config.seed);
        let mut arena = Self::empty(config, seeds.subsystem_rng("arena"));
        arena.reset();
        Ok(arena)
    }

    /// Build an arena in a fixed position. Used to set up exact scenarios.
    ///
    /// `body` is head first and must be non-empty, in bounds, pairwise
    /// distinct and not cover `target`.
    pub fn from_layout(
        config: &ArenaConfig,
        body: &[Coord],
        direction: Direction,
        target: Coord,
    ) -> Result<Self, ArenaError> {
        config.validate()?;
        let size = config.board_size;
        if body.is_empty() {
            return Err(ArenaError::InvalidLayout("body is empty".into()));
        }
        if let Some(c) = body.iter().chain([&target]).find(|c| !c.in_bounds(size)) {
            return Err(ArenaError::InvalidLayout(format!(
                "({}, {}) is outside a {size}x{size} board",
                c.x, c.y
            )));
        }
        for (i, c) in body.iter().enumerate() {
            if body[i + 1..].contains(c) {
                return Err(ArenaError::InvalidLayout(format!(
                    "body visits ({}, {}) twice",
                    c.x, c.y
                )));
            }
        }
        if body.contains(&target) {
            return Err(ArenaError::InvalidLayout("target lies on the body".into()));
        }

        let seeds = SeedHierarchy::from_option(config.seed);
        let mut arena = Self::empty(config, seeds.subsystem_rng("arena"));
        arena.body = body.iter().copied().collect();
        arena.target = target;
        arena.direction = direction;
        arena.last_direction = direction;
        arena.rebuild_board();
        Ok(arena)
    }

    fn empty(config: &ArenaConfig, rng: ChaCha8Rng) -> Self {
        Self {
            size: config.board_size,
            body: VecDeque::with_capacity(INITIAL_BODY_LEN),
            target: Coord::default(),
            direction: Direction::Up,
            last_direction: Direction::Up,
            done: false,
            reward: 0.0,
            wrap_walls: config.wrap_walls,
            block_reversal: config.block_reversal,
            shaping: RewardShaping::new(config.rewards),
            board: Board::new(config.board_size),
            rng,
        }
    }

    // -- lifecycle --

    /// Start a new episode in place: a length-3 body centred on the board,
    /// travelling in a random direction with the body trailing behind, and a
    /// target on a random free cell.
    pub fn reset(&mut self) {
        let centre = Coord::new(self.side() / 2, self.side() / 2);
        self.direction = Direction::ALL[self.rng.gen_range(0..Direction::COUNT)];
        self.last_direction = self.direction;

        let back = self.direction.opposite();
        self.body.clear();
        let mut cell = centre;
        for _ in 0..INITIAL_BODY_LEN {
            self.body.push_back(cell);
            cell = cell.step(back);
        }

        self.done = false;
        self.reward = 0.0;
        if !self.respawn_target() {
            self.done = true;
        }
        self.rebuild_board();
    }

    /// Advance one tick. Out-of-range actions act as `0` (Up). No-op once
    /// [`done`](Self::done) is set.
    pub fn apply_action(&mut self, action: i64) -> Transition {
        if self.done {
            return Transition::Ignored;
        }
        let direction = self.resolve(action);
        self.last_direction = self.direction;
        self.direction = direction;

        let transition = self.transition();
        self.rebuild_board();
        if transition.is_terminal() {
            let head = self.head();
            debug!(
                ?transition,
                head_x = head.x,
                head_y = head.y,
                len = self.body.len(),
                "arena finished"
            );
        }
        transition
    }

    fn transition(&mut self) -> Transition {
        let head = self.head();
        let Some(candidate) = self.candidate_head(head, self.direction) else {
            self.die();
            return Transition::HitWall;
        };

        let will_eat = candidate == self.target;
        if self.hits_body(candidate, will_eat) {
            self.body.push_front(candidate);
            self.die();
            return Transition::HitBody;
        }

        self.body.push_front(candidate);

        if will_eat {
            self.reward = self.shaping.eat();
            if self.respawn_target() {
                return Transition::Ate;
            }
            self.done = true;
            return Transition::Filled;
        }

        let turned = self.direction != self.last_direction;
        self.reward = self.shaping.step(
            head.manhattan(self.target),
            candidate.manhattan(self.target),
            turned,
        );
        self.body.pop_back();
        Transition::Moved
    }

    /// Whether `action` would end the episode by wall or body collision.
    /// Pure lookahead: nothing is mutated.
    #[must_use]
    pub fn would_collide(&self, action: i64) -> bool {
        let direction = self.resolve(action);
        match self.candidate_head(self.head(), direction) {
            None => true,
            Some(candidate) => self.hits_body(candidate, candidate == self.target),
        }
    }

    // -- rules --

    fn resolve(&self, action: i64) -> Direction {
        let requested = Direction::from_action(action);
        if self.block_reversal && requested == self.direction.opposite() {
            self.direction
        } else {
            requested
        }
    }

    /// Next head cell, or `None` if the move leaves a walled board.
    fn candidate_head(&self, head: Coord, direction: Direction) -> Option<Coord> {
        let candidate = head.step(direction);
        if candidate.in_bounds(self.size) {
            Some(candidate)
        } else if self.wrap_walls {
            Some(candidate.wrapped(self.size))
        } else {
            None
        }
    }

    /// The tail cell is free to enter unless this move eats, since an eat
    /// keeps the tail in place.
    fn hits_body(&self, candidate: Coord, will_eat: bool) -> bool {
        let tail = self.body.len().saturating_sub(1);
        self.body
            .iter()
            .enumerate()
            .any(|(i, &cell)| cell == candidate && (i != tail || will_eat))
    }

    fn die(&mut self) {
        self.done = true;
        self.reward = self.shaping.death();
    }

    /// Move the target to a uniformly random free cell. Returns `false` if
    /// the body covers the whole board.
    fn respawn_target(&mut self) -> bool {
        let free: Vec<Coord> = (0..self.side())
            .flat_map(|y| (0..self.side()).map(move |x| Coord::new(x, y)))
            .filter(|c| !self.body.contains(c))
            .collect();
        if free.is_empty() {
            return false;
        }
        self.target = free[self.rng.gen_range(0..free.len())];
        true
    }

    fn rebuild_board(&mut self) {
        self.board.clear();
        self.board.set(self.target, GridCell::Target);
        for &cell in &self.body {
            self.board.set(cell, GridCell::Occupant);
        }
    }

    fn side(&self) -> i32 {
        i32::try_from(self.size).unwrap_or(i32::MAX)
    }

    // -- accessors --

    #[must_use]
    pub const fn board(&self) -> &Board {
        &self.board
    }

    #[must_use]
    pub const fn board_size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn head(&self) -> Coord {
        self.body.front().copied().unwrap_or_default()
    }

    /// Body cells, head first.
    pub fn body(&self) -> impl ExactSizeIterator<Item = Coord> + '_ {
        self.body.iter().copied()
    }

    #[must_use]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    #[must_use]
    pub const fn target(&self) -> Coord {
        self.target
    }

    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub const fn last_direction(&self) -> Direction {
        self.last_direction
    }

    #[must_use]
    pub const fn done(&self) -> bool {
        self.done
    }

    /// Reward of the most recent transition.
    #[must_use]
    pub const fn reward(&self) -> f64 {
        self.reward
    }

    #[must_use]
    pub const fn wrap_walls(&self) -> bool {
        self.wrap_walls
    }

    /// Owned copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ArenaSnapshot {
        ArenaSnapshot {
            board: self.board.clone(),
            body: self.body().collect(),
            target: self.target,
            direction: self.direction,
            reward: self.reward,
            done: self.done,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
