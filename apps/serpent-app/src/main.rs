//! Serpent arena host CLI.
//!
//! Provides four modes of operation:
//! - `serve`: Wait for one decision process on TCP and run the plan
//! - `file`: Exchange state and actions through two files
//! - `headless`: Run on random fallback actions only
//! - `info`: Print crate versions and the default configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use serpent_core::prelude::*;
use serpent_env::prelude::*;
use serpent_gym::prelude::*;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Grid arena driven by an external decision process.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for one peer over TCP and run the plan.
    Serve {
        #[command(flatten)]
        run: RunArgs,

        /// Address to bind.
        #[arg(long)]
        address: Option<String>,

        /// Port to bind.
        #[arg(short, long)]
        port: Option<u16>,

        /// Bound on a single write to the peer, in milliseconds.
        #[arg(long)]
        write_timeout: Option<u64>,
    },

    /// Exchange state and actions through files.
    File {
        #[command(flatten)]
        run: RunArgs,

        /// File the latest record is written to.
        #[arg(long, default_value = "state.json")]
        state_path: PathBuf,

        /// File polled for `{"action": n}`.
        #[arg(long, default_value = "action.json")]
        action_path: PathBuf,
    },

    /// Run on random actions with no peer.
    Headless {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Print crate information.
    Info,
}

/// Run options shared by every mode. Flags override the config file.
#[derive(Args, Default)]
struct RunArgs {
    /// TOML session config.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of episodes to run.
    #[arg(short = 'n', long)]
    episodes: Option<u32>,

    /// Maximum steps per episode (0 = unlimited).
    #[arg(short, long)]
    max_steps: Option<u32>,

    /// Tick cadence in milliseconds.
    #[arg(long)]
    step_delay: Option<u64>,

    /// Pause between episodes in milliseconds.
    #[arg(long)]
    episode_pause: Option<u64>,

    /// Training budget announced to the agent.
    #[arg(long)]
    total_timesteps: Option<u64>,

    /// Random seed.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Board side length.
    #[arg(long)]
    board_size: Option<usize>,

    /// Wrap around the border instead of dying.
    #[arg(long)]
    wrap_walls: bool,

    /// Ignore actions that reverse into the neck.
    #[arg(long)]
    block_reversal: bool,

    /// Write the agent launcher config here before running.
    #[arg(long)]
    agent_config: Option<PathBuf>,
}

impl RunArgs {
    /// Load the config file (or defaults), apply flag overrides, validate.
    fn session(&self) -> Result<SessionConfig> {
        let mut cfg = match &self.config {
            Some(path) => SessionConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => SessionConfig::default(),
        };

        if let Some(n) = self.episodes {
            cfg.run.episodes = n;
        }
        if let Some(n) = self.max_steps {
            cfg.run.max_steps_per_episode = n;
        }
        if let Some(ms) = self.step_delay {
            cfg.run.step_delay_ms = ms;
        }
        if let Some(ms) = self.episode_pause {
            cfg.run.episode_pause_ms = ms;
        }
        if self.total_timesteps.is_some() {
            cfg.run.total_timesteps = self.total_timesteps;
        }
        if self.seed.is_some() {
            cfg.arena.seed = self.seed;
        }
        if let Some(size) = self.board_size {
            cfg.arena.board_size = size;
        }
        cfg.arena.wrap_walls |= self.wrap_walls;
        cfg.arena.block_reversal |= self.block_reversal;

        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }

    fn write_agent_config(&self, plan: &RunPlan) -> Result<()> {
        if let Some(path) = &self.agent_config {
            AgentConfig::from_plan(plan)
                .write_merged(path)
                .with_context(|| format!("writing agent config {}", path.display()))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

fn run_with<L: PeerLink>(cfg: &SessionConfig, link: L) -> Result<RunSummary> {
    let arena = Arena::new(&cfg.arena).context("building arena")?;
    let mut scheduler =
        EpisodeScheduler::new(arena, link).with_observer(Box::new(TracingObserver));
    if let Some(seed) = cfg.arena.seed {
        scheduler = scheduler.with_seed(seed);
    }
    let summary = scheduler.start(&cfg.run);
    scheduler.close();
    Ok(summary?)
}

fn run_serve(
    run: &RunArgs,
    address: Option<String>,
    port: Option<u16>,
    write_timeout: Option<u64>,
) -> Result<RunSummary> {
    let mut cfg = run.session()?;
    if let Some(address) = address {
        cfg.server.address = address;
    }
    if let Some(port) = port {
        cfg.server.port = port;
    }
    if write_timeout.is_some() {
        cfg.server.write_timeout_ms = write_timeout;
    }
    run.write_agent_config(&cfg.run)?;

    if !cfg.run.expect_peer {
        warn!("expect_peer is false, running without a peer");
        return run_with(&cfg, OfflineLink);
    }

    let mut transport = Transport::new().with_write_timeout(cfg.server.write_timeout());
    let addr = transport
        .bind(cfg.server.bind_addr())
        .with_context(|| format!("binding {}", cfg.server.bind_addr()))?;
    println!("serpent listening on {addr}");
    println!(
        "board={}, episodes={}, max_steps={}, step_delay={}ms",
        cfg.arena.board_size,
        cfg.run.episodes,
        cfg.run.max_steps_per_episode,
        cfg.run.step_delay_ms
    );
    run_with(&cfg, transport)
}

fn run_file(run: &RunArgs, state_path: PathBuf, action_path: PathBuf) -> Result<RunSummary> {
    let cfg = run.session()?;
    run.write_agent_config(&cfg.run)?;
    info!(state = %state_path.display(), action = %action_path.display(), "file mode");
    run_with(&cfg, FileLink::new(state_path, action_path))
}

fn run_headless(run: &RunArgs) -> Result<RunSummary> {
    let mut cfg = run.session()?;
    cfg.run.expect_peer = false;
    run.write_agent_config(&cfg.run)?;
    run_with(&cfg, OfflineLink)
}

fn print_summary(summary: &RunSummary) {
    for record in &summary.stats.history {
        println!(
            "episode {}: steps={}, reward={:.3}, end={}",
            record.episode,
            record.steps,
            record.reward,
            record.outcome.label()
        );
    }
    println!(
        "\n{:?}: episodes={}, steps={}, peer_actions={}, fallback_actions={}",
        summary.outcome,
        summary.stats.episodes_completed,
        summary.stats.total_steps,
        summary.peer_actions,
        summary.fallback_actions
    );
    if let Some(mean) = summary.stats.mean_reward() {
        println!("mean reward: {mean:.3}");
    }
}

fn run_info() -> Result<()> {
    println!("serpent v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("crates:");
    println!("  serpent-core {}", env!("CARGO_PKG_VERSION"));
    println!("  serpent-env  {}", env!("CARGO_PKG_VERSION"));
    println!("  serpent-gym  {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("default configuration:");
    let defaults =
        toml::to_string_pretty(&SessionConfig::default()).context("rendering defaults")?;
    println!("{defaults}");
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let summary = match cli.command {
        Some(Commands::Serve {
            run,
            address,
            port,
            write_timeout,
        }) => run_serve(&run, address, port, write_timeout)?,
        Some(Commands::File {
            run,
            state_path,
            action_path,
        }) => run_file(&run, state_path, action_path)?,
        Some(Commands::Headless { run }) => run_headless(&run)?,
        Some(Commands::Info) => return run_info(),
        None => run_headless(&RunArgs::default())?,
    };
    print_summary(&summary);
    Ok(())
}
