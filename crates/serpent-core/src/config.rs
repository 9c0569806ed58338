use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Smallest board that fits a length-3 body centred in any direction.
pub const MIN_BOARD_SIZE: usize = 5;
pub const MAX_BOARD_SIZE: usize = 256;
pub const DEFAULT_BOARD_SIZE: usize = 20;

pub const MIN_STEP_DELAY_MS: u64 = 5;
pub const MAX_STEP_DELAY_MS: u64 = 1000;
pub const DEFAULT_STEP_DELAY_MS: u64 = 50;
/// Cadence change applied by one speed-up / slow-down request.
pub const STEP_DELAY_INCREMENT_MS: u64 = 10;

/// Per-episode step caps above this are rejected as nonsensical.
pub const MAX_STEPS_PER_EPISODE_LIMIT: u32 = 10_000_000;

pub const DEFAULT_PORT: u16 = 5000;

/// Clamp a requested cadence into the supported range.
#[must_use]
pub fn clamp_step_delay(delay_ms: u64) -> u64 {
    delay_ms.clamp(MIN_STEP_DELAY_MS, MAX_STEP_DELAY_MS)
}

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_board_size() -> usize {
    DEFAULT_BOARD_SIZE
}
const fn default_episodes() -> u32 {
    10
}
const fn default_step_delay_ms() -> u64 {
    DEFAULT_STEP_DELAY_MS
}
const fn default_episode_pause_ms() -> u64 {
    1000
}
const fn default_true() -> bool {
    true
}
fn default_address() -> String {
    "127.0.0.1".into()
}
const fn default_port() -> u16 {
    DEFAULT_PORT
}
const fn default_death() -> f64 {
    -10.0
}
const fn default_eat() -> f64 {
    12.0
}
const fn default_step_penalty() -> f64 {
    -0.01
}
const fn default_distance_scale() -> f64 {
    0.2
}
const fn default_distance_clip() -> f64 {
    0.5
}
const fn default_turn_bonus() -> f64 {
    0.6
}
const fn default_step_clip() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// RewardConfig
// ---------------------------------------------------------------------------

/// Reward constants used by the arena's transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Reward for leaving the board or hitting the body.
    #[serde(default = "default_death")]
    pub death: f64,
    /// Reward for reaching the target.
    #[serde(default = "default_eat")]
    pub eat: f64,
    /// Base reward for every ordinary step.
    #[serde(default = "default_step_penalty")]
    pub step_penalty: f64,
    /// Multiplier on the Manhattan-distance delta.
    #[serde(default = "default_distance_scale")]
    pub distance_scale: f64,
    /// Symmetric clip applied to the distance term.
    #[serde(default = "default_distance_clip")]
    pub distance_clip: f64,
    /// Bonus for a turn that moves closer to the target.
    #[serde(default = "default_turn_bonus")]
    pub turn_bonus: f64,
    /// Symmetric clip applied to the summed step reward.
    #[serde(default = "default_step_clip")]
    pub step_clip: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            death: default_death(),
            eat: default_eat(),
            step_penalty: default_step_penalty(),
            distance_scale: default_distance_scale(),
            distance_clip: default_distance_clip(),
            turn_bonus: default_turn_bonus(),
            step_clip: default_step_clip(),
        }
    }
}

// ---------------------------------------------------------------------------
// ArenaConfig
// ---------------------------------------------------------------------------

/// Construction-time parameters of the arena engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Side length of the square board (default: 20).
    #[serde(default = "default_board_size")]
    pub board_size: usize,

    /// Wrap coordinates modulo the board size instead of dying at the border.
    #[serde(default)]
    pub wrap_walls: bool,

    /// Ignore actions that would reverse straight into the neck.
    #[serde(default)]
    pub block_reversal: bool,

    /// Root seed. `None` draws one from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub rewards: RewardConfig,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            board_size: default_board_size(),
            wrap_walls: false,
            block_reversal: false,
            seed: None,
            rewards: RewardConfig::default(),
        }
    }
}

impl ArenaConfig {
    /// Builder: set the board size.
    #[must_use]
    pub const fn with_board_size(mut self, size: usize) -> Self {
        self.board_size = size;
        self
    }

    /// Builder: set the root seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builder: enable or disable wall wrapping.
    #[must_use]
    pub const fn with_wrap_walls(mut self, wrap: bool) -> Self {
        self.wrap_walls = wrap;
        self
    }

    /// Builder: enable or disable reversal blocking.
    #[must_use]
    pub const fn with_block_reversal(mut self, block: bool) -> Self {
        self.block_reversal = block;
        self
    }

    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.board_size < MIN_BOARD_SIZE || self.board_size > MAX_BOARD_SIZE {
            return Err(ConfigError::InvalidBoardSize {
                size: self.board_size,
                min: MIN_BOARD_SIZE,
                max: MAX_BOARD_SIZE,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RunPlan
// ---------------------------------------------------------------------------

/// What the caller asks the scheduler to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    /// Number of episodes before the run finishes.
    #[serde(default = "default_episodes")]
    pub episodes: u32,

    /// Truncate an episode after this many ticks. `0` means no limit.
    #[serde(default)]
    pub max_steps_per_episode: u32,

    /// Tick cadence in milliseconds; also the action-read timeout.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    /// Pause between the end of one episode and the start of the next.
    #[serde(default = "default_episode_pause_ms")]
    pub episode_pause_ms: u64,

    /// Optional total training budget announced to the external process.
    #[serde(default)]
    pub total_timesteps: Option<u64>,

    /// Whether an external decision process is expected to connect.
    #[serde(default = "default_true")]
    pub expect_peer: bool,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            episodes: default_episodes(),
            max_steps_per_episode: 0,
            step_delay_ms: default_step_delay_ms(),
            episode_pause_ms: default_episode_pause_ms(),
            total_timesteps: None,
            expect_peer: true,
        }
    }
}

impl RunPlan {
    /// Builder: set the episode count.
    #[must_use]
    pub const fn with_episodes(mut self, episodes: u32) -> Self {
        self.episodes = episodes;
        self
    }

    /// Builder: set the per-episode step cap.
    #[must_use]
    pub const fn with_max_steps(mut self, steps: u32) -> Self {
        self.max_steps_per_episode = steps;
        self
    }

    /// Builder: set the tick cadence.
    #[must_use]
    pub const fn with_step_delay_ms(mut self, delay_ms: u64) -> Self {
        self.step_delay_ms = delay_ms;
        self
    }

    /// Builder: set the inter-episode pause.
    #[must_use]
    pub const fn with_episode_pause_ms(mut self, pause_ms: u64) -> Self {
        self.episode_pause_ms = pause_ms;
        self
    }

    /// Builder: set whether a peer is expected.
    #[must_use]
    pub const fn with_expect_peer(mut self, expect: bool) -> Self {
        self.expect_peer = expect;
        self
    }

    /// Tick cadence.
    #[must_use]
    pub const fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    /// Inter-episode pause.
    #[must_use]
    pub const fn episode_pause(&self) -> Duration {
        Duration::from_millis(self.episode_pause_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.episodes == 0 {
            return Err(ConfigError::InvalidEpisodeCount(self.episodes));
        }
        if self.max_steps_per_episode > MAX_STEPS_PER_EPISODE_LIMIT {
            return Err(ConfigError::InvalidStepBudget(format!(
                "max_steps_per_episode {} exceeds {MAX_STEPS_PER_EPISODE_LIMIT}",
                self.max_steps_per_episode
            )));
        }
        if self.total_timesteps == Some(0) {
            return Err(ConfigError::InvalidStepBudget(
                "total_timesteps must be > 0 when given".into(),
            ));
        }
        if !(MIN_STEP_DELAY_MS..=MAX_STEP_DELAY_MS).contains(&self.step_delay_ms) {
            return Err(ConfigError::InvalidStepDelay {
                delay_ms: self.step_delay_ms,
                min: MIN_STEP_DELAY_MS,
                max: MAX_STEP_DELAY_MS,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Where the transport endpoint listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional bound on a single write to the peer.
    #[serde(default)]
    pub write_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            write_timeout_ms: None,
        }
    }
}

impl ServerConfig {
    /// `address:port`, suitable for `TcpListener::bind`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    #[must_use]
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Complete configuration of a hosting session, as loaded from TOML.
///
/// # Example
///
/// ```
/// use serpent_core::config::SessionConfig;
///
/// let cfg = SessionConfig::from_toml_str("[run]\nepisodes = 3\n").unwrap();
/// assert_eq!(cfg.run.episodes, 3);
/// assert_eq!(cfg.arena.board_size, 20);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub arena: ArenaConfig,
    #[serde(default)]
    pub run: RunPlan,
    #[serde(default)]
    pub server: ServerConfig,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.arena.validate()?;
        self.run.validate()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
