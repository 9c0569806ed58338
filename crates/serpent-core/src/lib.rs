// serpent-core: grid types, configuration, errors and seeding for the serpent arena.

pub mod config;
pub mod error;
pub mod seed;
pub mod types;

pub mod prelude {
    pub use crate::{
        config::{ArenaConfig, RewardConfig, RunPlan, ServerConfig, SessionConfig},
        error::ConfigError,
        seed::SeedHierarchy,
        types::{Board, Coord, Direction, GridCell},
    };
}
