//! Arena engine, reward shaping and episode lifecycle for the serpent arena.
//!
//! Nothing in this crate performs I/O. The engine is driven one tick at a
//! time by `serpent-gym`'s scheduler or directly by tests.

pub mod arena;
pub mod episode;
pub mod rewards;
pub mod stats;

pub mod prelude {
    pub use crate::{
        arena::{Arena, ArenaError, ArenaSnapshot, Transition},
        episode::{Episode, EpisodeState},
        rewards::RewardShaping,
        stats::{EpisodeRecord, EpisodeStats},
    };
}
