//! Arena fixtures and stepping helpers.

use serpent_core::config::ArenaConfig;
use serpent_core::types::{Coord, Direction};
use serpent_env::arena::{Arena, Transition};

/// Seed used by fixtures that need one.
pub const FIXTURE_SEED: u64 = 7;

/// A seeded arena with default settings.
pub fn seeded_arena(seed: u64) -> Arena {
    Arena::new(&ArenaConfig::default().with_seed(seed)).expect("default config is valid")
}

/// A length-3 body in the middle of a `size` board heading Up, with the
/// target in the bottom-left corner.
pub fn heading_up_arena(size: usize) -> Arena {
    let config = ArenaConfig::default()
        .with_board_size(size)
        .with_seed(FIXTURE_SEED);
    let mid = i32::try_from(size / 2).expect("board size fits i32");
    let last = i32::try_from(size - 1).expect("board size fits i32");
    Arena::from_layout(
        &config,
        &[Coord::new(mid, mid), Coord::new(mid, mid + 1), Coord::new(mid, mid + 2)],
        Direction::Up,
        Coord::new(0, last),
    )
    .expect("layout is valid")
}

/// A body at the top edge heading Up: the next straight move is fatal.
pub fn wall_ahead_arena() -> Arena {
    Arena::from_layout(
        &ArenaConfig::default().with_seed(FIXTURE_SEED),
        &[Coord::new(5, 0), Coord::new(5, 1), Coord::new(5, 2)],
        Direction::Up,
        Coord::new(15, 15),
    )
    .expect("layout is valid")
}

/// A body whose next Up move lands on the target.
pub fn target_ahead_arena() -> Arena {
    Arena::from_layout(
        &ArenaConfig::default().with_seed(FIXTURE_SEED),
        &[Coord::new(10, 10), Coord::new(10, 11), Coord::new(10, 12)],
        Direction::Up,
        Coord::new(10, 9),
    )
    .expect("layout is valid")
}

/// The wire action that keeps the current heading.
pub fn straight_action(arena: &Arena) -> i64 {
    i64::from(arena.direction().index())
}

/// Apply `policy` until the arena is done or `max_steps` ticks ran.
/// Returns the transitions in order.
pub fn run_until_done(
    arena: &mut Arena,
    max_steps: usize,
    mut policy: impl FnMut(&Arena) -> i64,
) -> Vec<Transition> {
    let mut transitions = Vec::new();
    while !arena.done() && transitions.len() < max_steps {
        let action = policy(arena);
        transitions.push(arena.apply_action(action));
    }
    transitions
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
