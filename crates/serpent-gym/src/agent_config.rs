//! Launcher config file for the external decision process.
//!
//! The launcher reads a small JSON object telling the agent how long the
//! run will be. Keys other than the three written here are kept as found.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serpent_core::config::RunPlan;
use tracing::{debug, info};

/// Per-episode step count assumed when the plan has no step cap.
pub const DEFAULT_EPISODE_ESTIMATE: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub episodes: u32,
    /// `0` means no cap.
    pub max_steps: u32,
    pub total_timesteps: Option<u64>,
}

impl AgentConfig {
    #[must_use]
    pub const fn from_plan(plan: &RunPlan) -> Self {
        Self {
            episodes: plan.episodes,
            max_steps: plan.max_steps_per_episode,
            total_timesteps: plan.total_timesteps,
        }
    }

    /// The explicit budget, or `episodes * max_steps` (200 per episode when
    /// uncapped).
    ///
    /// ```
    /// use serpent_gym::agent_config::AgentConfig;
    ///
    /// let cfg = AgentConfig { episodes: 10, max_steps: 0, total_timesteps: None };
    /// assert_eq!(cfg.estimated_total_timesteps(), 2000);
    /// ```
    #[must_use]
    pub fn estimated_total_timesteps(&self) -> u64 {
        self.total_timesteps.unwrap_or_else(|| {
            let per_episode = if self.max_steps > 0 {
                u64::from(self.max_steps)
            } else {
                DEFAULT_EPISODE_ESTIMATE
            };
            u64::from(self.episodes) * per_episode
        })
    }

    /// Write the three keys into the JSON object at `path`.
    ///
    /// An existing object keeps its other keys; a missing or unparsable file
    /// is replaced. Parent directories are created.
    pub fn write_merged(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        let mut object = match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                _ => {
                    debug!(path = %path.display(), "agent config unreadable, starting fresh");
                    Map::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e),
        };

        object.insert("episodes".into(), Value::from(self.episodes));
        object.insert("max_steps".into(), Value::from(self.max_steps));
        object.insert(
            "total_timesteps".into(),
            Value::from(self.estimated_total_timesteps()),
        );

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(&Value::Object(object))?;
        fs::write(path, body)?;
        info!(
            path = %path.display(),
            episodes = self.episodes,
            max_steps = self.max_steps,
            total_timesteps = self.estimated_total_timesteps(),
            "agent config written"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
