//! TCP endpoint holding at most one peer connection.
//!
//! [`Transport`] binds a listener, accepts exactly one peer, and exchanges
//! newline-delimited records with it. Reads go through an internal byte
//! buffer so a bounded read that expires mid-record loses nothing: the next
//! call starts a fresh wait and picks up where the bytes left off.
//!
//! When the peer hangs up or a read or write fails, the dead connection is
//! dropped. The listener stays bound, so the next
//! [`accept_one`](Transport::accept_one) waits for a new peer.
//!
//! A [`CloseHandle`] can close the endpoint from another thread. A read or
//! accept blocked at that moment returns [`TransportError::Closed`].

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

use crate::framing::{decode, encode};
use crate::protocol::{MAX_RECORD_BYTES, Message, MessageKind, ProtocolError};

/// How often a blocked accept re-checks the closed flag.
const ACCEPT_POLL: Duration = Duration::from_millis(10);

const READ_CHUNK: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No peer is connected")]
    NotConnected,

    #[error("Endpoint is not listening")]
    NotListening,

    #[error("Write to peer failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("Read from peer failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Write to peer timed out")]
    Timeout,

    #[error("Peer closed the connection")]
    PeerClosed,

    #[error("Endpoint was closed")]
    Closed,

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to accept a peer: {0}")]
    Accept(#[source] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

// ---------------------------------------------------------------------------
// Incoming
// ---------------------------------------------------------------------------

/// Result of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Message(Message),
    /// The bounded wait expired with no complete record.
    Timeout,
    /// The peer closed its side cleanly.
    EndOfStream,
}

// ---------------------------------------------------------------------------
// Shared close state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Shared {
    closed: AtomicBool,
    /// Clone of the peer socket so another thread can shut it down.
    peer: Mutex<Option<TcpStream>>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn register_peer(&self, stream: Option<TcpStream>) {
        *self.peer.lock().unwrap_or_else(PoisonError::into_inner) = stream;
    }

    /// Returns `true` the first time it is called.
    fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if let Some(stream) = self
            .peer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = stream.shutdown(Shutdown::Both);
        }
        first
    }
}

/// Closes a [`Transport`] from any thread.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    shared: Arc<Shared>,
}

impl CloseHandle {
    pub fn close(&self) {
        if self.shared.close() {
            info!("transport closed by handle");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Single-peer TCP endpoint.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use serpent_gym::protocol::Message;
/// use serpent_gym::transport::{Incoming, Transport};
///
/// let mut transport = Transport::new();
/// transport.listen_and_accept_one("127.0.0.1:5000").unwrap();
/// transport.send(&Message::init(20)).unwrap();
/// match transport.receive_with_timeout(Duration::from_millis(50)).unwrap() {
///     Incoming::Message(msg) => println!("got {}", msg.kind()),
///     Incoming::Timeout => println!("peer is quiet"),
///     Incoming::EndOfStream => println!("peer left"),
/// }
/// ```
#[derive(Debug)]
pub struct Transport {
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    peer_addr: Option<SocketAddr>,
    pending: Vec<u8>,
    write_timeout: Option<Duration>,
    shared: Arc<Shared>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listener: None,
            stream: None,
            peer_addr: None,
            pending: Vec::new(),
            write_timeout: None,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Builder: bound every write to the peer. `None` or zero means unbounded.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    #[must_use]
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    #[must_use]
    pub const fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Address of the listener, once bound.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    // -- connection setup --

    /// Bind the listener. Returns the bound address; a second call keeps the
    /// existing listener.
    pub fn bind(
        &mut self,
        addr: impl ToSocketAddrs + std::fmt::Debug,
    ) -> Result<SocketAddr, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if let Some(local) = self.local_addr() {
            return Ok(local);
        }
        let describe = format!("{addr:?}");
        let listener = TcpListener::bind(addr).map_err(|source| TransportError::Bind {
            addr: describe.clone(),
            source,
        })?;
        let local = listener.local_addr().map_err(|source| TransportError::Bind {
            addr: describe,
            source,
        })?;
        info!(%local, "transport listening");
        self.listener = Some(listener);
        Ok(local)
    }

    /// Block until one peer connects. No-op if a live peer is already attached.
    pub fn accept_one(&mut self) -> Result<SocketAddr, TransportError> {
        if let (Some(addr), true) = (self.peer_addr, self.stream.is_some()) {
            return Ok(addr);
        }
        let listener = self.listener.as_ref().ok_or(TransportError::NotListening)?;
        listener
            .set_nonblocking(true)
            .map_err(TransportError::Accept)?;

        let (stream, addr) = loop {
            if self.shared.is_closed() {
                return Err(TransportError::Closed);
            }
            match listener.accept() {
                Ok(conn) => break conn,
                Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::sleep(ACCEPT_POLL),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(TransportError::Accept(e)),
            }
        };

        stream.set_nonblocking(false).map_err(TransportError::Accept)?;
        stream.set_nodelay(true).map_err(TransportError::Accept)?;
        stream
            .set_write_timeout(self.write_timeout)
            .map_err(TransportError::Accept)?;
        self.shared.register_peer(stream.try_clone().ok());
        // A close that raced with accept must still release the new peer.
        if self.shared.is_closed() {
            let _ = stream.shutdown(Shutdown::Both);
            self.shared.register_peer(None);
            return Err(TransportError::Closed);
        }

        info!(%addr, "peer connected");
        self.stream = Some(stream);
        self.peer_addr = Some(addr);
        self.pending.clear();
        Ok(addr)
    }

    /// Bind `addr` and wait for one peer. No-op if already connected.
    pub fn listen_and_accept_one(
        &mut self,
        addr: impl ToSocketAddrs + std::fmt::Debug,
    ) -> Result<SocketAddr, TransportError> {
        if let (Some(peer), true) = (self.peer_addr, self.stream.is_some()) {
            return Ok(peer);
        }
        self.bind(addr)?;
        self.accept_one()
    }

    // -- message exchange --

    /// Encode and write one record.
    pub fn send(&mut self, msg: &Message) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let line = encode(msg)?;
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let result = stream.write_all(line.as_bytes()).and_then(|()| stream.flush());
        match result {
            Ok(()) => {
                debug!(kind = %msg.kind(), bytes = line.len(), "sent");
                Ok(())
            }
            Err(_) if self.shared.is_closed() => Err(TransportError::Closed),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(TransportError::Timeout)
            }
            Err(e) => {
                self.drop_peer();
                Err(TransportError::WriteFailed(e))
            }
        }
    }

    /// Block until one record arrives or the peer closes the stream.
    pub fn receive(&mut self) -> Result<Incoming, TransportError> {
        self.read_until(None)
    }

    /// Like [`receive`](Self::receive) but gives up after `timeout`,
    /// returning [`Incoming::Timeout`].
    pub fn receive_with_timeout(&mut self, timeout: Duration) -> Result<Incoming, TransportError> {
        self.read_until(Some(Instant::now() + timeout))
    }

    /// Block until an `ACTION` arrives and return its value. `PING` is
    /// answered with `PING`; every other kind is skipped.
    pub fn receive_action_blocking(&mut self) -> Result<i64, TransportError> {
        loop {
            match self.receive()? {
                Incoming::Message(msg) => match msg.kind() {
                    MessageKind::Action => return Ok(msg.action_value()?),
                    MessageKind::Ping => self.send(&Message::ping())?,
                    other => debug!(kind = %other, "skipping while waiting for an action"),
                },
                Incoming::EndOfStream => return Err(TransportError::PeerClosed),
                Incoming::Timeout => {}
            }
        }
    }

    fn read_until(&mut self, deadline: Option<Instant>) -> Result<Incoming, TransportError> {
        loop {
            if let Some(msg) = self.take_record()? {
                debug!(kind = %msg.kind(), "received");
                return Ok(Incoming::Message(msg));
            }
            if self.shared.is_closed() {
                return Err(TransportError::Closed);
            }

            let wait = match deadline {
                None => None,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(Incoming::Timeout);
                    }
                    Some(deadline - now)
                }
            };

            let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
            stream
                .set_read_timeout(wait)
                .map_err(TransportError::ReadFailed)?;
            let mut chunk = [0u8; READ_CHUNK];
            let result = stream.read(&mut chunk);

            match result {
                Ok(0) => {
                    if self.shared.is_closed() {
                        return Err(TransportError::Closed);
                    }
                    info!("peer closed the stream");
                    self.drop_peer();
                    return Ok(Incoming::EndOfStream);
                }
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(_) if self.shared.is_closed() => return Err(TransportError::Closed),
                Err(e) => {
                    self.drop_peer();
                    return Err(TransportError::ReadFailed(e));
                }
            }
        }
    }

    /// Forget a dead peer, keeping the listener for the next accept.
    fn drop_peer(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.shared.register_peer(None);
        self.peer_addr = None;
        self.pending.clear();
    }

    /// Pop the next complete non-blank record from the buffer.
    fn take_record(&mut self) -> Result<Option<Message>, TransportError> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = std::str::from_utf8(&raw)
                .map_err(|e| ProtocolError::MalformedRecord(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(decode(line)?));
        }
        if self.pending.len() > MAX_RECORD_BYTES {
            let size = self.pending.len();
            self.pending.clear();
            return Err(ProtocolError::RecordTooLarge {
                size,
                max: MAX_RECORD_BYTES,
            }
            .into());
        }
        Ok(None)
    }

    /// Release the peer and the listener. Idempotent.
    pub fn close(&mut self) {
        let first = self.shared.close();
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.listener = None;
        self.peer_addr = None;
        self.pending.clear();
        if first {
            info!("transport closed");
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};

    fn connected_pair() -> (Transport, TcpStream) {
        let mut transport = Transport::new();
        let addr = transport.bind("127.0.0.1:0").unwrap();
        let client = std::thread::spawn(move || TcpStream::connect(addr).unwrap());
        transport.accept_one().unwrap();
        (transport, client.join().unwrap())
    }

    #[test]
    fn send_without_peer_is_not_connected() {
        let mut transport = Transport::new();
        assert!(matches!(
            transport.send(&Message::ping()),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn accept_without_bind_is_not_listening() {
        let mut transport = Transport::new();
        assert!(matches!(
            transport.accept_one(),
            Err(TransportError::NotListening)
        ));
    }

    #[test]
    fn send_writes_one_line() {
        let (mut transport, client) = connected_pair();
        transport.send(&Message::init(12)).unwrap();
        let mut reader = BufReader::new(client);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "{\"type\":\"INIT\",\"payload\":{\"board_size\":12}}\n");
    }

    #[test]
    fn receive_reassembles_split_records() {
        let (mut transport, mut client) = connected_pair();
        client.write_all(b"{\"type\":\"ACTION\",").unwrap();
        assert_eq!(
            transport
                .receive_with_timeout(Duration::from_millis(30))
                .unwrap(),
            Incoming::Timeout
        );
        client
            .write_all(b"\"payload\":{\"action\":2}}\n{\"type\":\"PING\"}\n")
            .unwrap();
        assert_eq!(transport.receive().unwrap(), Incoming::Message(Message::action(2)));
        assert_eq!(transport.receive().unwrap(), Incoming::Message(Message::ping()));
    }

    #[test]
    fn receive_reports_end_of_stream() {
        let (mut transport, client) = connected_pair();
        drop(client);
        assert_eq!(transport.receive().unwrap(), Incoming::EndOfStream);
    }

    #[test]
    fn end_of_stream_releases_the_peer() {
        let (mut transport, client) = connected_pair();
        drop(client);
        assert_eq!(transport.receive().unwrap(), Incoming::EndOfStream);
        assert!(!transport.is_connected());
        assert_eq!(transport.peer_addr(), None);
        assert!(transport.local_addr().is_some());
        assert!(matches!(
            transport.receive(),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn accept_after_hangup_takes_a_new_peer() {
        let (mut transport, first) = connected_pair();
        let addr = transport.local_addr().unwrap();
        drop(first);
        assert_eq!(transport.receive().unwrap(), Incoming::EndOfStream);

        let second = std::thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream
                .write_all(b"{\"type\":\"ACTION\",\"payload\":{\"action\":1}}\n")
                .unwrap();
            stream
        });
        let peer = transport.accept_one().unwrap();
        let client = second.join().unwrap();
        assert_eq!(client.local_addr().unwrap(), peer);
        assert_eq!(
            transport
                .receive_with_timeout(Duration::from_secs(2))
                .unwrap(),
            Incoming::Message(Message::action(1))
        );
    }

    #[test]
    fn malformed_record_is_protocol_error() {
        let (mut transport, mut client) = connected_pair();
        client.write_all(b"hello\n").unwrap();
        assert!(matches!(
            transport.receive(),
            Err(TransportError::Protocol(ProtocolError::MalformedRecord(_)))
        ));
    }

    #[test]
    fn unknown_kind_is_protocol_error() {
        let (mut transport, mut client) = connected_pair();
        client.write_all(b"{\"type\":\"QUIT\"}\n").unwrap();
        assert!(matches!(
            transport.receive(),
            Err(TransportError::Protocol(ProtocolError::UnknownKind(_)))
        ));
    }

    #[test]
    fn second_accept_is_noop() {
        let (mut transport, _client) = connected_pair();
        let first = transport.peer_addr().unwrap();
        assert_eq!(transport.accept_one().unwrap(), first);
        assert_eq!(
            transport.listen_and_accept_one("127.0.0.1:0").unwrap(),
            first
        );
    }

    #[test]
    fn blocking_action_read_answers_ping() {
        let (mut transport, mut client) = connected_pair();
        let script = concat!(
            "{\"type\":\"PING\",\"payload\":{}}\n",
            "{\"type\":\"RESET\",\"payload\":{}}\n",
            "{\"type\":\"ACTION\",\"payload\":{\"action\":3}}\n",
        );
        client.write_all(script.as_bytes()).unwrap();
        assert_eq!(transport.receive_action_blocking().unwrap(), 3);
        let mut reader = BufReader::new(client);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(crate::framing::decode(&line).unwrap(), Message::ping());
    }

    #[test]
    fn close_is_idempotent() {
        let (mut transport, _client) = connected_pair();
        transport.close();
        transport.close();
        assert!(transport.is_closed());
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.send(&Message::ping()),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn close_handle_interrupts_blocked_receive() {
        let (mut transport, _client) = connected_pair();
        let handle = transport.close_handle();
        let closer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle.close();
        });
        let started = Instant::now();
        let result = transport.receive();
        closer.join().unwrap();
        assert!(matches!(result, Err(TransportError::Closed)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn close_handle_interrupts_accept() {
        let mut transport = Transport::new();
        transport.bind("127.0.0.1:0").unwrap();
        let handle = transport.close_handle();
        let closer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            handle.close();
        });
        assert!(matches!(transport.accept_one(), Err(TransportError::Closed)));
        closer.join().unwrap();
    }
}
