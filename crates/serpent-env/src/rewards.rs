//! Per-step reward shaping for non-terminal, non-eating moves.

use serpent_core::config::RewardConfig;

/// Clip `value` into `[-limit, limit]`. A negative limit is treated as its magnitude.
fn symmetric_clip(value: f64, limit: f64) -> f64 {
    let limit = limit.abs();
    value.max(-limit).min(limit)
}

/// Reward calculator built from a [`RewardConfig`].
///
/// # Example
///
/// ```
/// use serpent_core::config::RewardConfig;
/// use serpent_env::rewards::RewardShaping;
///
/// let shaping = RewardShaping::new(RewardConfig::default());
/// // One cell closer, after a turn: -0.01 + 0.2 + 0.6
/// assert!((shaping.step(5, 4, true) - 0.79).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RewardShaping {
    config: RewardConfig,
}

impl RewardShaping {
    #[must_use]
    pub const fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Reward for a fatal move.
    #[must_use]
    pub const fn death(&self) -> f64 {
        self.config.death
    }

    /// Reward for reaching the target.
    #[must_use]
    pub const fn eat(&self) -> f64 {
        self.config.eat
    }

    /// Shaped reward for an ordinary step.
    ///
    /// `old_distance` and `new_distance` are Manhattan distances from the head
    /// to the target before and after the move. The turn bonus only applies
    /// when the move turned *and* strictly closed in on the target.
    #[must_use]
    pub fn step(&self, old_distance: u32, new_distance: u32, turned: bool) -> f64 {
        let c = &self.config;
        let delta = f64::from(old_distance) - f64::from(new_distance);
        let distance_term = symmetric_clip(c.distance_scale * delta, c.distance_clip);
        let turn_term = if turned && new_distance < old_distance {
            c.turn_bonus
        } else {
            0.0
        };
        symmetric_clip(c.step_penalty + distance_term + turn_term, c.step_clip)
    }
}
