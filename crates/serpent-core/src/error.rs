use thiserror::Error;

/// Configuration errors. Raised eagerly, before a run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid episode count: {0} (must be >= 1)")]
    InvalidEpisodeCount(u32),

    #[error("Invalid step budget: {0}")]
    InvalidStepBudget(String),

    #[error("Invalid board size: {size} (must be in {min}..={max})")]
    InvalidBoardSize { size: usize, min: usize, max: usize },

    #[error("Invalid step delay: {delay_ms} ms (must be in {min}..={max})")]
    InvalidStepDelay { delay_ms: u64, min: u64, max: u64 },
}
