//! A scripted external process speaking the wire protocol over TCP.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serpent_core::types::Direction;
use serpent_gym::framing::{read_message, write_message};
use serpent_gym::protocol::{Message, MessageKind, ProtocolError};

/// How the peer answers each `STATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Reply with the reported heading.
    Straight,
    /// Always reply with this action.
    Fixed(i64),
    /// Never reply.
    Silent,
    /// Reply straight, then hang up after this many `STATE` messages.
    DisconnectAfter(usize),
    /// Answer each `STATE` with a `PING` instead of an action.
    Ping,
}

/// What the peer saw before the session ended.
#[derive(Debug, Default, Clone)]
pub struct PeerLog {
    pub received: Vec<Message>,
    pub actions_sent: usize,
    pub pings_received: usize,
}

impl PeerLog {
    pub fn kinds(&self) -> Vec<MessageKind> {
        self.received.iter().map(Message::kind).collect()
    }

    pub fn count(&self, kind: MessageKind) -> usize {
        self.received.iter().filter(|m| m.kind() == kind).count()
    }
}

/// Handle to a running peer thread.
pub struct TestPeer {
    handle: JoinHandle<Result<PeerLog, ProtocolError>>,
}

impl TestPeer {
    /// Connect to `addr` (retrying for up to two seconds) and play
    /// `behavior` until the server closes the connection.
    pub fn spawn(addr: SocketAddr, behavior: PeerBehavior) -> Self {
        let handle = thread::spawn(move || {
            let stream = connect_with_retry(addr, Duration::from_secs(2))?;
            play(stream, behavior)
        });
        Self { handle }
    }

    /// Wait for the session to end and return what the peer saw.
    pub fn join(self) -> PeerLog {
        self.handle
            .join()
            .expect("peer thread panicked")
            .expect("peer protocol error")
    }
}

fn connect_with_retry(addr: SocketAddr, patience: Duration) -> std::io::Result<TcpStream> {
    let deadline = Instant::now() + patience;
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) if Instant::now() >= deadline => return Err(e),
            Err(_) => thread::sleep(Duration::from_millis(10)),
        }
    }
}

fn play(stream: TcpStream, behavior: PeerBehavior) -> Result<PeerLog, ProtocolError> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);
    let mut log = PeerLog::default();
    let mut states = 0usize;

    while let Some(msg) = read_message(&mut reader)? {
        let kind = msg.kind();
        if kind == MessageKind::Ping {
            log.pings_received += 1;
        }
        let heading = (kind == MessageKind::State)
            .then(|| msg.to_state())
            .transpose()?
            .map(|s| s.direction);
        log.received.push(msg);
        let Some(heading) = heading else {
            continue;
        };
        states += 1;
        let straight = i64::from(Direction::from_action(heading).index());

        let reply = match behavior {
            PeerBehavior::Straight => Some(Message::action(straight)),
            PeerBehavior::Fixed(action) => Some(Message::action(action)),
            PeerBehavior::Silent => None,
            PeerBehavior::Ping => Some(Message::ping()),
            PeerBehavior::DisconnectAfter(n) if states >= n => break,
            PeerBehavior::DisconnectAfter(_) => Some(Message::action(straight)),
        };
        if let Some(reply) = reply {
            if reply.kind() == MessageKind::Action {
                log.actions_sent += 1;
            }
            write_message(&mut writer, &reply)?;
        }
    }
    Ok(log)
}
