//! Shared test fixtures and utilities for serpent crates.
//!
//! Provides seeded arenas, deterministic RNG, an in-process scripted
//! [`PeerLink`](serpent_gym::link::PeerLink), a recording observer, and a
//! TCP peer thread that speaks the wire protocol.

pub mod arenas;
pub mod mocks;
pub mod peer;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use arenas::{
    heading_up_arena, run_until_done, seeded_arena, straight_action, target_ahead_arena,
    wall_ahead_arena,
};
pub use mocks::{Recording, RecordingObserver, ScriptedLink};
pub use peer::{PeerBehavior, PeerLog, TestPeer};
pub use rng::{action_script, seeded_rng};
