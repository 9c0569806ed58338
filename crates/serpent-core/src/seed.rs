//! Deterministic seed hierarchy for reproducible runs.
//!
//! ```text
//! Run seed
//! └── Episode seed (per episode index)
//!     └── Subsystem seed ("arena", "fallback", ...)
//! ```
//!
//! Child seeds are derived by hashing, so an entire run is reproducible from
//! a single root seed.

use std::hash::{DefaultHasher, Hash, Hasher};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Derive a child seed from a parent seed and a string key.
///
/// # Example
///
/// ```
/// use serpent_core::seed::derive_seed;
///
/// let child = derive_seed(42, "arena");
/// assert_ne!(child, 42);
/// assert_eq!(child, derive_seed(42, "arena"));
/// ```
#[must_use]
pub fn derive_seed(parent: u64, key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    parent.hash(&mut hasher);
    key.hash(&mut hasher);
    hasher.finish()
}

/// Derive a child seed from a parent seed and a numeric index.
#[must_use]
pub fn derive_seed_indexed(parent: u64, index: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    parent.hash(&mut hasher);
    index.hash(&mut hasher);
    hasher.finish()
}

/// Hierarchical seed manager.
///
/// # Example
///
/// ```
/// use serpent_core::seed::SeedHierarchy;
///
/// let seeds = SeedHierarchy::new(7);
/// assert_eq!(seeds.episode_seed(3), SeedHierarchy::new(7).episode_seed(3));
/// assert_ne!(seeds.subsystem_seed("arena"), seeds.subsystem_seed("fallback"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedHierarchy {
    root: u64,
}

impl SeedHierarchy {
    #[must_use]
    pub const fn new(root: u64) -> Self {
        Self { root }
    }

    /// Hierarchy rooted at a seed drawn from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    /// Hierarchy rooted at `seed`, or at fresh entropy when `None`.
    #[must_use]
    pub fn from_option(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::new)
    }

    /// The root (run-level) seed.
    #[must_use]
    pub const fn root(&self) -> u64 {
        self.root
    }

    /// Seed for a given episode index.
    #[must_use]
    pub fn episode_seed(&self, episode: u64) -> u64 {
        derive_seed_indexed(self.root, episode)
    }

    /// Seed for a named run-level subsystem.
    #[must_use]
    pub fn subsystem_seed(&self, subsystem: &str) -> u64 {
        derive_seed(self.root, subsystem)
    }

    /// RNG for a named run-level subsystem.
    #[must_use]
    pub fn subsystem_rng(&self, subsystem: &str) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.subsystem_seed(subsystem))
    }

    /// RNG for an episode.
    #[must_use]
    pub fn episode_rng(&self, episode: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.episode_seed(episode))
    }
}

impl Default for SeedHierarchy {
    fn default() -> Self {
        Self::new(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
