//! Decision sources behind one contract: send the peer a message, then wait
//! a bounded time for its action.
//!
//! - [`Transport`]: a TCP peer speaking the line protocol.
//! - [`FileLink`]: a peer that reads a state file and writes an action file.
//! - [`OfflineLink`]: no peer at all; every tick falls back.
//!
//! [`fetch_action_or_fallback`] turns "no answer" into a uniformly random
//! action, so the scheduler never stalls on a slow or silent peer.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::Value;
use serpent_core::types::Direction;
use tracing::{debug, info, warn};

use crate::framing::{decode, encode};
use crate::protocol::{Message, MessageKind};
use crate::transport::{Incoming, Transport, TransportError};

// ---------------------------------------------------------------------------
// PeerLink
// ---------------------------------------------------------------------------

/// A bounded decision source.
pub trait PeerLink {
    /// Wait for the peer to become available.
    fn attach(&mut self) -> Result<(), TransportError>;

    /// Deliver one message to the peer.
    fn send(&mut self, msg: &Message) -> Result<(), TransportError>;

    /// Wait up to `timeout` for an action. `Ok(None)` means the caller
    /// should fall back.
    fn poll_action(&mut self, timeout: Duration) -> Result<Option<i64>, TransportError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Release any resources. Idempotent.
    fn close(&mut self) {}
}

impl PeerLink for Transport {
    /// Requires [`bind`](Transport::bind) to have been called first.
    fn attach(&mut self) -> Result<(), TransportError> {
        self.accept_one().map(|_| ())
    }

    fn send(&mut self, msg: &Message) -> Result<(), TransportError> {
        Self::send(self, msg)
    }

    fn poll_action(&mut self, timeout: Duration) -> Result<Option<i64>, TransportError> {
        match self.receive_with_timeout(timeout)? {
            Incoming::Message(msg) => match msg.kind() {
                MessageKind::Action => Ok(Some(msg.action_value()?)),
                MessageKind::Ping => {
                    Self::send(self, &Message::ping())?;
                    Ok(None)
                }
                other => {
                    warn!(kind = %other, "expected ACTION, falling back");
                    Ok(None)
                }
            },
            Incoming::Timeout => Ok(None),
            Incoming::EndOfStream => Err(TransportError::PeerClosed),
        }
    }

    fn name(&self) -> &'static str {
        "socket"
    }

    fn close(&mut self) {
        Self::close(self);
    }
}

// ---------------------------------------------------------------------------
// FileLink
// ---------------------------------------------------------------------------

/// Exchanges state and actions through two files.
///
/// Each outgoing message replaces the state file with its encoded record.
/// The action file may hold `{"action": n}` or a full `ACTION` record; it is
/// deleted once read.
#[derive(Debug, Clone)]
pub struct FileLink {
    state_path: PathBuf,
    action_path: PathBuf,
    poll_interval: Duration,
}

impl FileLink {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

    #[must_use]
    pub fn new(state_path: impl Into<PathBuf>, action_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
            action_path: action_path.into(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    #[must_use]
    pub fn action_path(&self) -> &Path {
        &self.action_path
    }

    /// Parse an action file body. `None` if it is incomplete or not an action.
    fn parse_action(text: &str) -> Option<i64> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let value: Value = serde_json::from_str(text).ok()?;
        if value.get("type").is_some() {
            let msg = decode(text).ok()?;
            return (msg.kind() == MessageKind::Action)
                .then(|| msg.action_value().ok())
                .flatten();
        }
        value.get("action").and_then(Value::as_i64)
    }

    fn remove_action_file(&self) -> Result<(), TransportError> {
        match fs::remove_file(&self.action_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TransportError::ReadFailed(e)),
        }
    }
}

impl PeerLink for FileLink {
    /// Clears any stale action left by a previous run.
    fn attach(&mut self) -> Result<(), TransportError> {
        self.remove_action_file()?;
        if let Some(parent) = self.state_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(TransportError::WriteFailed)?;
        }
        info!(
            state = %self.state_path.display(),
            action = %self.action_path.display(),
            "file link ready"
        );
        Ok(())
    }

    fn send(&mut self, msg: &Message) -> Result<(), TransportError> {
        let line = encode(msg)?;
        let tmp = self.state_path.with_extension("tmp");
        fs::write(&tmp, line.as_bytes()).map_err(TransportError::WriteFailed)?;
        fs::rename(&tmp, &self.state_path).map_err(TransportError::WriteFailed)?;
        debug!(kind = %msg.kind(), "state file written");
        Ok(())
    }

    fn poll_action(&mut self, timeout: Duration) -> Result<Option<i64>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            match fs::read_to_string(&self.action_path) {
                Ok(text) => {
                    if let Some(action) = Self::parse_action(&text) {
                        self.remove_action_file()?;
                        return Ok(Some(action));
                    }
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(TransportError::ReadFailed(e)),
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

// ---------------------------------------------------------------------------
// OfflineLink
// ---------------------------------------------------------------------------

/// No peer. Messages are dropped and every poll falls back immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineLink;

impl PeerLink for OfflineLink {
    fn attach(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn send(&mut self, _msg: &Message) -> Result<(), TransportError> {
        Ok(())
    }

    fn poll_action(&mut self, _timeout: Duration) -> Result<Option<i64>, TransportError> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// Where a tick's action came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOrigin {
    Peer,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionChoice {
    pub action: i64,
    pub origin: ActionOrigin,
}

/// A uniformly random action in `0..4`.
pub fn random_action(rng: &mut impl Rng) -> i64 {
    let index = rng.gen_range(0..Direction::COUNT);
    i64::from(Direction::ALL[index].index())
}

/// Ask `link` for an action, substituting a random one if none arrives in
/// time. Errors other than silence are passed through.
pub fn fetch_action_or_fallback<L: PeerLink + ?Sized>(
    link: &mut L,
    timeout: Duration,
    rng: &mut impl Rng,
) -> Result<ActionChoice, TransportError> {
    Ok(match link.poll_action(timeout)? {
        Some(action) => ActionChoice {
            action,
            origin: ActionOrigin::Peer,
        },
        None => ActionChoice {
            action: random_action(rng),
            origin: ActionOrigin::Fallback,
        },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
